//! Indexer worker: the single consumer of the work queue.
//!
//! For every popped `FileInfo` the worker filters by extension, reads the
//! file, chunks it, embeds each chunk, and commits the result to the store
//! (one transaction per file, under the writer lock) and to the ANN.
//! Embedding failures degrade the chunk to keyword-only; read failures
//! skip the file entirely, to be repaired by the next scan or event.

use std::sync::Arc;

use crate::chunk::{chunk_lines, Chunk};
use crate::daemon::DaemonState;
use crate::scanner::FileInfo;

/// Consumes the queue until it is stopped and drained.
pub async fn run(state: Arc<DaemonState>) {
    log::debug!("indexer worker started");
    while let Some(info) = state.queue.pop().await {
        process_file(&state, &info).await;
    }
    log::debug!("indexer worker stopped");
}

/// Indexes a single file end to end.
pub async fn process_file(state: &DaemonState, info: &FileInfo) {
    if !state.is_indexable(&info.path) {
        log::debug!("skipping {} (extension not indexed)", info.path.display());
        return;
    }

    let content = match tokio::fs::read_to_string(&info.path).await {
        Ok(c) => c,
        Err(e) => {
            log::debug!("skipping {}: {}", info.path.display(), e);
            return;
        }
    };

    let chunks = chunk_lines(&content, state.config.chunk_size, state.config.chunk_overlap);
    let prepared = embed_chunks(state, chunks).await;
    let embedded = prepared.iter().filter(|(_, v)| v.is_some()).count();

    let _writer = state.write_lock.write().await;
    let ids = match state.store.commit_file(info, &prepared).await {
        Ok(ids) => ids,
        Err(e) => {
            log::warn!("failed to commit {}: {}", info.path.display(), e);
            return;
        }
    };

    if let Some(index) = state.index.as_ref() {
        for (id, (_, vector)) in ids.iter().zip(prepared.iter()) {
            if let Some(vector) = vector {
                index.add(*id, vector);
            }
        }
    }

    log::info!(
        "indexed {} ({} chunks, {} embedded)",
        info.path.display(),
        ids.len(),
        embedded
    );
}

/// Embeds each chunk, mapping failures and empty vectors to `None` so the
/// chunk is still committed as keyword-searchable.
async fn embed_chunks(state: &DaemonState, chunks: Vec<Chunk>) -> Vec<(Chunk, Option<Vec<f32>>)> {
    let mut prepared = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let vector = match state.embedder.as_ref() {
            Some(embedder) => match embedder.embed(&chunk.content).await {
                Ok(v) if !v.is_empty() => Some(v),
                Ok(_) => None,
                Err(e) => {
                    log::debug!("embedding failed for a chunk: {}", e);
                    None
                }
            },
            None => None,
        };
        prepared.push((chunk, vector));
    }
    prepared
}
