//! In-memory approximate-nearest-neighbor index over chunk ids.
//!
//! Wraps an HNSW graph (L2 distance) keyed by chunk rowid. The store's
//! embedding BLOBs are the source of truth; the graph is derived state,
//! rebuilt from the store at startup according to the memory mode. There is
//! no deletion: ids whose chunks have been removed stay in the graph and
//! are filtered out by the query path when it probes the store.
//!
//! Persistence snapshots the raw `(id, vector)` pairs as JSON and rebuilds
//! the graph on load. Vectors whose width differs from the current embedder
//! dimension are dropped with a warning, which covers a backend switch
//! without a clean rebuild.

use anyhow::{Context, Result};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// HNSW construction parameters. M = 16 connections per layer and
/// ef_construction = 200 trade build speed for recall at the corpus sizes
/// a single codebase produces.
const MAX_NB_CONNECTION: usize = 16;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const EF_SEARCH: usize = 24;

pub struct VectorIndex {
    dim: usize,
    hnsw: Hnsw<'static, f32, DistL2>,
    /// Raw entries retained for `save`; the graph cannot be iterated back
    /// into vectors.
    entries: Mutex<Vec<(i64, Vec<f32>)>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    dim: usize,
    entries: Vec<(i64, Vec<f32>)>,
}

impl VectorIndex {
    pub fn new(dim: usize, max_elements: usize) -> Self {
        Self {
            dim,
            hnsw: Hnsw::new(
                MAX_NB_CONNECTION,
                max_elements,
                MAX_LAYER,
                EF_CONSTRUCTION,
                DistL2 {},
            ),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Inserts a vector under a chunk id. A vector of the wrong width is
    /// dropped with a diagnostic rather than corrupting the graph.
    pub fn add(&self, id: i64, vector: &[f32]) {
        if vector.len() != self.dim {
            log::warn!(
                "vector index: dimension mismatch for chunk {} (expected {}, got {}), dropping",
                id,
                self.dim,
                vector.len()
            );
            return;
        }

        let owned = vector.to_vec();
        self.hnsw.insert((&owned, id as usize));
        self.entries
            .lock()
            .expect("vector index mutex poisoned")
            .push((id, owned));
    }

    /// Returns up to `k` chunk ids ordered nearest-first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<i64> {
        if query.len() != self.dim {
            log::warn!(
                "vector index: query dimension mismatch (expected {}, got {})",
                self.dim,
                query.len()
            );
            return Vec::new();
        }
        if k == 0 || self.count() == 0 {
            return Vec::new();
        }

        self.hnsw
            .search(query, k, EF_SEARCH.max(k))
            .into_iter()
            .map(|neighbour| neighbour.d_id as i64)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.hnsw.get_nb_point()
    }

    /// Writes an `(id, vector)` snapshot to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        let entries = self
            .entries
            .lock()
            .expect("vector index mutex poisoned")
            .clone();
        let snapshot = Snapshot {
            dim: self.dim,
            entries,
        };
        let json = serde_json::to_string(&snapshot)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write vector index snapshot {}", path.display()))?;
        Ok(())
    }

    /// Rebuilds an index from a snapshot, keeping only vectors that match
    /// the requested dimension.
    pub fn load(path: &Path, dim: usize, max_elements: usize) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read vector index snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;

        let index = Self::new(dim, max_elements);
        let mut dropped = 0usize;
        for (id, vector) in snapshot.entries {
            if vector.len() == dim {
                index.add(id, &vector);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::warn!(
                "vector index: dropped {} snapshot vectors with stale dimensions (snapshot dim {}, current {})",
                dropped,
                snapshot.dim,
                dim
            );
        }
        Ok(index)
    }
}
