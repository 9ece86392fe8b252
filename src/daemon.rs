//! Daemon lifecycle: startup sequence, memory-mode bootstrap, task
//! wiring, and ordered shutdown.
//!
//! Startup order matters: store, then embedder, then the memory-mode ANN
//! load (the ANN is sized by the embedder's dimension), then the worker,
//! watcher, and bootstrap scan, and finally the IPC listener. Shutdown
//! reverses it: stop the queue, drop the watcher, let the server and
//! worker drain, close the store.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{watch, RwLock};

use crate::config::{Config, MemoryMode};
use crate::embedding::{create_embedder, Embedder};
use crate::queue::JobQueue;
use crate::server;
use crate::store::Store;
use crate::vector_index::VectorIndex;
use crate::watcher;
use crate::worker;

/// ANN capacity for RAM and HYBRID modes.
const INDEX_CAPACITY: usize = 100_000;

/// Shared daemon state. Config and embedder are immutable after startup;
/// the store and ANN are written only by the indexer worker (and the
/// watcher's delete path) under `write_lock`.
pub struct DaemonState {
    pub config: Config,
    pub root: PathBuf,
    pub store: Store,
    pub index: Option<VectorIndex>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub queue: JobQueue,
    /// Store writer lock: held for writing by the worker's per-file commit
    /// and the watcher's deletions; query readers take it shared.
    pub write_lock: RwLock<()>,
    shutdown_tx: watch::Sender<bool>,
    extensions: HashSet<String>,
}

impl DaemonState {
    pub fn new(
        config: Config,
        root: PathBuf,
        store: Store,
        index: Option<VectorIndex>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let extensions = config
            .index_extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();

        Arc::new(Self {
            config,
            root,
            store,
            index,
            embedder,
            queue: JobQueue::new(),
            write_lock: RwLock::new(()),
            shutdown_tx,
            extensions,
        })
    }

    /// A receiver that resolves once shutdown has been requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Extension allow-list gate applied by the indexer worker.
    pub fn is_indexable(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Number of vectors resident in the ANN.
    pub fn memory_items(&self) -> usize {
        self.index.as_ref().map(|i| i.count()).unwrap_or(0)
    }
}

/// Builds the ANN according to the memory mode and fills it from the
/// store. Returns `None` in DISK mode or when no embedder is available to
/// size the index.
async fn build_index(
    config: &Config,
    store: &Store,
    embedder: Option<&Arc<dyn Embedder>>,
) -> Result<Option<VectorIndex>> {
    let limit = match config.memory_mode {
        MemoryMode::Ram => usize::MAX,
        MemoryMode::Hybrid => config.hybrid_limit,
        MemoryMode::Disk => {
            log::info!("memory mode disk: semantic queries fall back to keyword search");
            return Ok(None);
        }
    };

    let Some(embedder) = embedder else {
        log::warn!("no embedding backend available; running without a vector index");
        return Ok(None);
    };

    let dim = embedder.dimension();
    let index = VectorIndex::new(dim, INDEX_CAPACITY);

    let mut loaded = 0usize;
    let mut dropped = 0usize;
    store
        .for_each_vector(|id, vector| {
            if vector.len() != dim {
                dropped += 1;
                return true;
            }
            index.add(id, &vector);
            loaded += 1;
            loaded < limit
        })
        .await?;

    if dropped > 0 {
        log::warn!(
            "dropped {} stored vectors whose dimensions do not match the current model ({}); run a full reindex to rebuild them",
            dropped,
            dim
        );
    }
    log::info!(
        "vector index ready: {} vectors resident ({} mode)",
        loaded,
        config.memory_mode.as_str()
    );

    Ok(Some(index))
}

/// Runs the daemon until a shutdown request or signal arrives.
pub async fn run(
    root: PathBuf,
    config: Config,
    db_path: PathBuf,
    socket_path: PathBuf,
) -> Result<()> {
    log::info!("starting kestrd, watching {}", root.display());

    let store = Store::open(&db_path).await?;

    let embedder = match create_embedder(&config) {
        Ok(e) => {
            log::info!(
                "embedding backend: {} ({}, {} dims)",
                config.embedding_backend,
                e.model_name(),
                e.dimension()
            );
            Some(e)
        }
        Err(e) => {
            log::warn!("embedding backend unavailable: {}; keyword search only", e);
            None
        }
    };

    let index = build_index(&config, &store, embedder.as_ref()).await?;
    let state = DaemonState::new(config, root, store, index, embedder);

    // Bootstrap scan: hash-gated, so unchanged files are not re-queued.
    spawn_scan(state.clone(), true);

    let worker_handle = tokio::spawn(worker::run(state.clone()));
    let watcher_guard = watcher::start(state.clone())?;

    // Stale socket from an unclean exit.
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("failed to bind socket {}", socket_path.display()))?;
    log::info!("listening on {}", socket_path.display());
    let server_handle = tokio::spawn(server::serve(state.clone(), listener));

    wait_for_shutdown(&state).await;

    log::info!("stopping components");
    state.queue.stop();
    drop(watcher_guard);
    let _ = worker_handle.await;
    let _ = server_handle.await;
    state.store.close().await;
    let _ = std::fs::remove_file(&socket_path);

    log::info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown(state: &Arc<DaemonState>) {
    let mut shutdown_rx = state.shutdown_signal();
    if state.shutdown_requested() {
        return;
    }
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("failed to install SIGTERM handler: {}", e);
            let _ = shutdown_rx.changed().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupt received, shutting down");
            state.request_shutdown();
        }
        _ = sigterm.recv() => {
            log::info!("termination requested, shutting down");
            state.request_shutdown();
        }
        _ = shutdown_rx.changed() => {}
    }
}

/// Scans the root and feeds the queue. When `hash_gated` is true only
/// files whose content hash differs from the stored one are queued; the
/// `reindex` request scans ungated.
pub fn spawn_scan(state: Arc<DaemonState>, hash_gated: bool) {
    tokio::spawn(async move {
        let root = state.root.clone();
        let files = tokio::task::spawn_blocking(move || {
            let scanner = crate::scanner::Scanner::new(&root);
            scanner.scan_all(&root)
        })
        .await
        .unwrap_or_default();

        let total = files.len();
        let mut queued = 0usize;
        for info in files {
            if state.shutdown_requested() {
                return;
            }
            let push = if hash_gated {
                match state.store.needs_indexing(&info.path, &info.hash).await {
                    Ok(dirty) => dirty,
                    Err(e) => {
                        log::warn!("scan: change check failed for {}: {}", info.path.display(), e);
                        false
                    }
                }
            } else {
                true
            };
            if push {
                state.queue.push(info);
                queued += 1;
            }
        }
        log::info!("scan complete: {} files seen, {} queued", total, queued);
    });
}
