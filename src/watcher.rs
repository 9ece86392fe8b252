//! File-system watcher adapter.
//!
//! Translates OS change notifications into the same work items the scanner
//! produces. Writes push unconditionally (the event itself means content
//! changed); deletions remove the file row directly under the writer lock,
//! leaving the stale ANN entry for the query path to filter. Renames are
//! handled as a synthetic delete of the old path plus an index of the new
//! path, so no stale row survives a move.
//!
//! The recursive watch covers directories created after startup.

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::daemon::DaemonState;
use crate::ignore::IgnoreSet;
use crate::scanner::file_info;

/// What the adapter should do for one event path.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchAction {
    /// Re-stat, re-hash, and queue the path for indexing.
    Index(PathBuf),
    /// Remove the path's file row (chunks cascade).
    Remove(PathBuf),
}

/// Maps a notify event to adapter actions. Pure so the event grammar can
/// be tested without a live watcher.
pub fn translate(event: &Event) -> Vec<WatchAction> {
    let paths = &event.paths;
    match &event.kind {
        EventKind::Create(_) => paths.iter().cloned().map(WatchAction::Index).collect(),

        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths
                .first()
                .cloned()
                .map(WatchAction::Remove)
                .into_iter()
                .collect(),
            RenameMode::To => paths
                .first()
                .cloned()
                .map(WatchAction::Index)
                .into_iter()
                .collect(),
            // Both (and platform-dependent variants) carry old then new.
            _ if paths.len() >= 2 => vec![
                WatchAction::Remove(paths[0].clone()),
                WatchAction::Index(paths[paths.len() - 1].clone()),
            ],
            _ => paths.iter().cloned().map(WatchAction::Index).collect(),
        },

        EventKind::Modify(_) => paths.iter().cloned().map(WatchAction::Index).collect(),

        EventKind::Remove(_) => paths.iter().cloned().map(WatchAction::Remove).collect(),

        // Access events and anything the platform cannot classify.
        _ => Vec::new(),
    }
}

/// Keeps the OS watch registration alive; dropping it stops event
/// delivery.
pub struct WatcherGuard {
    _watcher: RecommendedWatcher,
    _task: JoinHandle<()>,
}

/// Attaches a recursive watch to the daemon root and spawns the event
/// loop.
pub fn start(state: Arc<DaemonState>) -> Result<WatcherGuard> {
    let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default(),
    )
    .context("failed to initialize file watcher")?;

    watcher
        .watch(&state.root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", state.root.display()))?;
    log::info!("watching {}", state.root.display());

    let mut ignore = IgnoreSet::new();
    ignore.add_defaults();
    ignore.load(&state.root.join(".kestr_ignore"));

    let task = tokio::spawn(event_loop(state, rx, ignore));

    Ok(WatcherGuard {
        _watcher: watcher,
        _task: task,
    })
}

async fn event_loop(
    state: Arc<DaemonState>,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ignore: IgnoreSet,
) {
    let mut shutdown = state.shutdown_signal();
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(Ok(event)) => handle_event(&state, &ignore, event).await,
                Some(Err(e)) => {
                    // Event-queue overflow and the like: the next full
                    // scan repairs any drift.
                    log::warn!("watcher error: {}", e);
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    log::debug!("watcher loop stopped");
}

async fn handle_event(state: &Arc<DaemonState>, ignore: &IgnoreSet, event: Event) {
    for action in translate(&event) {
        match action {
            WatchAction::Index(path) => {
                if ignore.check(&path) {
                    continue;
                }
                // Vanished files (or directories) drop out here silently.
                if let Some(info) = file_info(&path) {
                    log::debug!("watch: queueing {}", path.display());
                    state.queue.push(info);
                }
            }
            WatchAction::Remove(path) => {
                if ignore.check(&path) {
                    continue;
                }
                log::debug!("watch: removing {}", path.display());
                let _writer = state.write_lock.write().await;
                if let Err(e) = state.store.delete_file(&path).await {
                    log::warn!("watch: failed to delete {}: {}", path.display(), e);
                }
            }
        }
    }
}
