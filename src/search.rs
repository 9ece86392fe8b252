//! Hybrid retrieval: semantic-preferred with keyword fallback.
//!
//! A query first goes through the embedder and the ANN index. Ids returned
//! by the ANN are probed against the store so soft-deleted chunks drop out
//! silently. If the semantic path produces nothing (no ANN, no embedder,
//! empty query vector, or every id stale), the query falls back to literal
//! keyword search. A failed query path yields an empty list, never an
//! error.

use serde::Serialize;

use crate::daemon::DaemonState;

/// Maximum results returned per query path.
pub const DEFAULT_RESULT_LIMIT: i64 = 5;

/// One query result row.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    /// `"semantic"` or `"keyword"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
    /// `[start_line, end_line]`, 1-based inclusive.
    pub lines: [i64; 2],
}

/// Runs the hybrid query path. Semantic results preserve the ANN's
/// nearest-first order; keyword results preserve store iteration order.
pub async fn hybrid_query(state: &DaemonState, query: &str) -> Vec<QueryHit> {
    let mut hits = Vec::new();

    if let (Some(index), Some(embedder)) = (state.index.as_ref(), state.embedder.as_ref()) {
        match embedder.embed(query).await {
            Ok(vector) if !vector.is_empty() => {
                let ids = index.search(&vector, DEFAULT_RESULT_LIMIT as usize);
                let _reader = state.write_lock.read().await;
                for id in ids {
                    match state.store.get_chunk(id).await {
                        Ok(Some(chunk)) => hits.push(QueryHit {
                            kind: "semantic",
                            content: chunk.content,
                            lines: [chunk.start_line, chunk.end_line],
                        }),
                        // stale id: chunk was deleted after the ANN add
                        Ok(None) => {}
                        Err(e) => log::warn!("query: chunk lookup failed: {}", e),
                    }
                }
            }
            Ok(_) => log::debug!("query: empty query vector, falling back to keyword search"),
            Err(e) => log::debug!("query: embedding failed ({}), falling back to keyword", e),
        }
    }

    if hits.is_empty() {
        let _reader = state.write_lock.read().await;
        match state.store.keyword_search(query, DEFAULT_RESULT_LIMIT).await {
            Ok(chunks) => {
                for chunk in chunks {
                    hits.push(QueryHit {
                        kind: "keyword",
                        content: chunk.content,
                        lines: [chunk.start_line, chunk.end_line],
                    });
                }
            }
            Err(e) => log::warn!("query: keyword search failed: {}", e),
        }
    }

    hits
}
