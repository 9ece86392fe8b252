//! Persistent metadata and chunk store.
//!
//! Two tables back the daemon: `files` records every sighted file with the
//! content hash used for change detection, and `chunks` holds the indexed
//! text windows with their optional embedding BLOBs. Chunk rows cascade on
//! file deletion, so a chunk can never outlive its file row.
//!
//! Every operation is self-flushing. The worker additionally groups its
//! per-file writes inside one transaction ([`Store::commit_file`]) so a
//! concurrent reader observes either the old or the new version of a file,
//! never a half-indexed one.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::chunk::Chunk;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::scanner::FileInfo;

/// A chunk row as returned by lookups and keyword search.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: i64,
    pub content: String,
    pub start_line: i64,
    pub end_line: i64,
}

/// A file row.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub hash: String,
    pub mtime_ms: i64,
    pub size: i64,
    pub indexed: bool,
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (or creates) the store at `path` and ensures the schema
    /// exists. Idempotent.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data dir {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            // substring search is literal and case-sensitive
            .pragma("case_sensitive_like", "1");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open store at {}", path.display()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                hash TEXT NOT NULL,
                last_modified INTEGER,
                size INTEGER,
                is_indexed INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                embedding BLOB,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_path ON files(path)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// True when no row exists for `path` or the stored hash differs from
    /// `hash`. An unknown (empty) current hash always reads as dirty.
    pub async fn needs_indexing(&self, path: &Path, hash: &str) -> Result<bool> {
        let stored: Option<String> = sqlx::query_scalar("SELECT hash FROM files WHERE path = ?")
            .bind(path_key(path))
            .fetch_optional(&self.pool)
            .await?;

        Ok(match stored {
            Some(stored) => stored != hash,
            None => true,
        })
    }

    /// Inserts or updates the file row, resetting `is_indexed`.
    pub async fn upsert_file(&self, info: &FileInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (path, hash, last_modified, size, is_indexed)
            VALUES (?, ?, ?, ?, 0)
            ON CONFLICT(path) DO UPDATE SET
                hash = excluded.hash,
                last_modified = excluded.last_modified,
                size = excluded.size,
                is_indexed = 0
            "#,
        )
        .bind(path_key(&info.path))
        .bind(&info.hash)
        .bind(info.mtime_ms)
        .bind(info.size as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_indexed(&self, path: &Path, indexed: bool) -> Result<()> {
        sqlx::query("UPDATE files SET is_indexed = ? WHERE path = ?")
            .bind(indexed as i64)
            .bind(path_key(path))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the file row; chunk rows cascade. Safe for unknown paths.
    pub async fn delete_file(&self, path: &Path) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(path_key(path))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_file(&self, path: &Path) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT id, path, hash, last_modified, size, is_indexed FROM files WHERE path = ?",
        )
        .bind(path_key(path))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| FileRecord {
            id: row.get("id"),
            path: row.get("path"),
            hash: row.get("hash"),
            mtime_ms: row.get("last_modified"),
            size: row.get("size"),
            indexed: row.get::<i64, _>("is_indexed") != 0,
        }))
    }

    /// Inserts a single chunk for an already-recorded file. Returns the new
    /// chunk id, or `None` when no file row exists for `path` (the caller
    /// logs and drops the chunk).
    pub async fn insert_chunk(
        &self,
        path: &Path,
        chunk: &Chunk,
        embedding: Option<&[f32]>,
    ) -> Result<Option<i64>> {
        let file_id: Option<i64> = sqlx::query_scalar("SELECT id FROM files WHERE path = ?")
            .bind(path_key(path))
            .fetch_optional(&self.pool)
            .await?;

        let Some(file_id) = file_id else {
            return Ok(None);
        };

        let result = sqlx::query(
            "INSERT INTO chunks (file_id, content, start_line, end_line, embedding) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(&chunk.content)
        .bind(chunk.start_line)
        .bind(chunk.end_line)
        .bind(embedding.filter(|e| !e.is_empty()).map(vec_to_blob))
        .execute(&self.pool)
        .await?;

        Ok(Some(result.last_insert_rowid()))
    }

    /// Commits one file atomically: upserts the file row, replaces its
    /// chunk rows with the given set, and marks it indexed. Returns the new
    /// chunk ids in input order.
    ///
    /// An empty chunk set still records the file (and its hash) so the next
    /// scan does not retry it.
    pub async fn commit_file(
        &self,
        info: &FileInfo,
        chunks: &[(Chunk, Option<Vec<f32>>)],
    ) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let key = path_key(&info.path);

        sqlx::query(
            r#"
            INSERT INTO files (path, hash, last_modified, size, is_indexed)
            VALUES (?, ?, ?, ?, 0)
            ON CONFLICT(path) DO UPDATE SET
                hash = excluded.hash,
                last_modified = excluded.last_modified,
                size = excluded.size,
                is_indexed = 0
            "#,
        )
        .bind(&key)
        .bind(&info.hash)
        .bind(info.mtime_ms)
        .bind(info.size as i64)
        .execute(&mut *tx)
        .await?;

        let file_id: i64 = sqlx::query_scalar("SELECT id FROM files WHERE path = ?")
            .bind(&key)
            .fetch_one(&mut *tx)
            .await?;

        // Replace, not append: a re-indexed file must tile cleanly.
        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks {
            let result = sqlx::query(
                "INSERT INTO chunks (file_id, content, start_line, end_line, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(file_id)
            .bind(&chunk.content)
            .bind(chunk.start_line)
            .bind(chunk.end_line)
            .bind(
                embedding
                    .as_deref()
                    .filter(|e| !e.is_empty())
                    .map(vec_to_blob),
            )
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }

        sqlx::query("UPDATE files SET is_indexed = 1 WHERE id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ids)
    }

    /// Literal substring search over chunk content, bounded by `limit`.
    /// LIKE wildcards in the query are escaped so `%` and `_` match
    /// themselves.
    pub async fn keyword_search(&self, query: &str, limit: i64) -> Result<Vec<StoredChunk>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(
            r#"
            SELECT id, content, start_line, end_line
            FROM chunks
            WHERE content LIKE ? ESCAPE '\'
            LIMIT ?
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StoredChunk {
                id: row.get("id"),
                content: row.get("content"),
                start_line: row.get("start_line"),
                end_line: row.get("end_line"),
            })
            .collect())
    }

    pub async fn get_chunk(&self, id: i64) -> Result<Option<StoredChunk>> {
        let row = sqlx::query("SELECT id, content, start_line, end_line FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| StoredChunk {
            id: row.get("id"),
            content: row.get("content"),
            start_line: row.get("start_line"),
            end_line: row.get("end_line"),
        }))
    }

    /// Iterates all chunks with a non-null embedding in rowid order,
    /// yielding `(chunk_id, vector)`. The callback returns `false` to stop
    /// early (HYBRID mode stops at its residency limit). Used only at
    /// startup.
    pub async fn for_each_vector<F>(&self, mut callback: F) -> Result<()>
    where
        F: FnMut(i64, Vec<f32>) -> bool,
    {
        let rows = sqlx::query(
            "SELECT id, embedding FROM chunks WHERE embedding IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let id: i64 = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            if blob.is_empty() {
                continue;
            }
            if !callback(id, blob_to_vec(&blob)) {
                break;
            }
        }
        Ok(())
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if c == '%' || c == '_' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("kestr.db")).await.unwrap();
        (dir, store)
    }

    fn info(path: &str, hash: &str) -> FileInfo {
        FileInfo {
            path: PathBuf::from(path),
            size: 42,
            mtime_ms: 1_700_000_000_000,
            hash: hash.to_string(),
        }
    }

    fn chunk(content: &str, start: i64, end: i64) -> Chunk {
        Chunk {
            content: content.to_string(),
            start_line: start,
            end_line: end,
        }
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kestr.db");
        let first = Store::open(&path).await.unwrap();
        first.close().await;
        Store::open(&path).await.unwrap();
    }

    #[tokio::test]
    async fn needs_indexing_tracks_hash_changes() {
        let (_dir, store) = open_store().await;
        let path = Path::new("/repo/a.md");

        assert!(store.needs_indexing(path, "h1").await.unwrap());

        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        assert!(!store.needs_indexing(path, "h1").await.unwrap());
        assert!(store.needs_indexing(path, "h2").await.unwrap());
        // an unknown current hash is always dirty
        assert!(store.needs_indexing(path, "").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_roundtrips_stat_fields_and_resets_indexed() {
        let (_dir, store) = open_store().await;
        let path = Path::new("/repo/a.md");

        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        store.mark_indexed(path, true).await.unwrap();
        assert!(store.get_file(path).await.unwrap().unwrap().indexed);

        store.upsert_file(&info("/repo/a.md", "h2")).await.unwrap();
        let record = store.get_file(path).await.unwrap().unwrap();
        assert_eq!(record.hash, "h2");
        assert_eq!(record.size, 42);
        assert_eq!(record.mtime_ms, 1_700_000_000_000);
        assert!(!record.indexed);
    }

    #[tokio::test]
    async fn insert_chunk_requires_a_file_row() {
        let (_dir, store) = open_store().await;
        let orphan = store
            .insert_chunk(Path::new("/repo/ghost.md"), &chunk("text\n", 1, 1), None)
            .await
            .unwrap();
        assert!(orphan.is_none());

        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        let id = store
            .insert_chunk(Path::new("/repo/a.md"), &chunk("text\n", 1, 1), None)
            .await
            .unwrap();
        assert!(id.is_some());
    }

    #[tokio::test]
    async fn delete_cascades_to_chunks() {
        let (_dir, store) = open_store().await;
        let path = Path::new("/repo/a.md");

        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        let id = store
            .insert_chunk(path, &chunk("doomed\n", 1, 1), Some(&[0.1, 0.2]))
            .await
            .unwrap()
            .unwrap();

        store.delete_file(path).await.unwrap();
        assert!(store.get_chunk(id).await.unwrap().is_none());
        assert!(store.get_file(path).await.unwrap().is_none());

        // deleting again is harmless
        store.delete_file(path).await.unwrap();
    }

    #[tokio::test]
    async fn commit_file_replaces_previous_chunks() {
        let (_dir, store) = open_store().await;
        let path = Path::new("/repo/a.md");

        let old_ids = store
            .commit_file(
                &info("/repo/a.md", "h1"),
                &[
                    (chunk("old one\n", 1, 1), None),
                    (chunk("old two\n", 2, 2), None),
                ],
            )
            .await
            .unwrap();
        assert_eq!(old_ids.len(), 2);
        assert!(store.get_file(path).await.unwrap().unwrap().indexed);

        let new_ids = store
            .commit_file(
                &info("/repo/a.md", "h2"),
                &[(chunk("new one\n", 1, 1), Some(vec![0.5, 0.5]))],
            )
            .await
            .unwrap();
        assert_eq!(new_ids.len(), 1);

        for old in &old_ids {
            assert!(store.get_chunk(*old).await.unwrap().is_none());
        }
        let kept = store.get_chunk(new_ids[0]).await.unwrap().unwrap();
        assert_eq!(kept.content, "new one\n");
    }

    #[tokio::test]
    async fn commit_file_with_no_chunks_still_records_the_file() {
        let (_dir, store) = open_store().await;
        let path = Path::new("/repo/empty.md");

        let ids = store
            .commit_file(&info("/repo/empty.md", "h-empty"), &[])
            .await
            .unwrap();
        assert!(ids.is_empty());

        let record = store.get_file(path).await.unwrap().unwrap();
        assert!(record.indexed);
        assert_eq!(record.hash, "h-empty");
        assert!(!store.needs_indexing(path, "h-empty").await.unwrap());
    }

    #[tokio::test]
    async fn keyword_search_is_literal() {
        let (_dir, store) = open_store().await;
        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        let path = Path::new("/repo/a.md");

        store
            .insert_chunk(path, &chunk("progress: 100% done\n", 1, 1), None)
            .await
            .unwrap();
        store
            .insert_chunk(path, &chunk("progress: 100x done\n", 2, 2), None)
            .await
            .unwrap();
        store
            .insert_chunk(path, &chunk("snake_case name\n", 3, 3), None)
            .await
            .unwrap();

        let hits = store.keyword_search("100%", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("100% done"));

        let hits = store.keyword_search("snake_case", 5).await.unwrap();
        assert_eq!(hits.len(), 1);

        // "_" must not act as a single-character wildcard
        let hits = store.keyword_search("snakeXcase", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn keyword_search_is_case_sensitive() {
        let (_dir, store) = open_store().await;
        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        let path = Path::new("/repo/a.md");

        store
            .insert_chunk(path, &chunk("Mixed Case Needle\n", 1, 1), None)
            .await
            .unwrap();

        assert_eq!(store.keyword_search("Case Needle", 5).await.unwrap().len(), 1);
        assert!(store.keyword_search("case needle", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keyword_search_respects_limit() {
        let (_dir, store) = open_store().await;
        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        let path = Path::new("/repo/a.md");

        for i in 0..10i64 {
            store
                .insert_chunk(path, &chunk(&format!("needle {}\n", i), i, i), None)
                .await
                .unwrap();
        }

        let hits = store.keyword_search("needle", 5).await.unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn for_each_vector_yields_embedded_chunks_in_order() {
        let (_dir, store) = open_store().await;
        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        let path = Path::new("/repo/a.md");

        store
            .insert_chunk(path, &chunk("no vector\n", 1, 1), None)
            .await
            .unwrap();
        let with_vec = store
            .insert_chunk(path, &chunk("has vector\n", 2, 2), Some(&[1.0, 2.0]))
            .await
            .unwrap()
            .unwrap();
        store
            .insert_chunk(path, &chunk("another\n", 3, 3), Some(&[3.0, 4.0]))
            .await
            .unwrap();

        let mut seen = Vec::new();
        store
            .for_each_vector(|id, vector| {
                seen.push((id, vector));
                true
            })
            .await
            .unwrap();

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, with_vec);
        assert_eq!(seen[0].1, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn for_each_vector_stops_when_callback_says_so() {
        let (_dir, store) = open_store().await;
        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        let path = Path::new("/repo/a.md");

        for i in 0..5i64 {
            store
                .insert_chunk(path, &chunk(&format!("c{}\n", i), i, i), Some(&[i as f32]))
                .await
                .unwrap();
        }

        let mut count = 0;
        store
            .for_each_vector(|_, _| {
                count += 1;
                count < 2
            })
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn escape_like_covers_wildcards_and_backslash() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\dir"), "c:\\\\dir");
    }

    #[tokio::test]
    async fn empty_embedding_is_stored_as_null() {
        let (_dir, store) = open_store().await;
        store.upsert_file(&info("/repo/a.md", "h1")).await.unwrap();
        let path = Path::new("/repo/a.md");

        store
            .insert_chunk(path, &chunk("empty vec\n", 1, 1), Some(&[]))
            .await
            .unwrap();

        let mut seen = 0;
        store
            .for_each_vector(|_, _| {
                seen += 1;
                true
            })
            .await
            .unwrap();
        assert_eq!(seen, 0);
    }
}
