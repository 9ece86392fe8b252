//! Bounded-latency handoff between the producers (scanner, watcher) and
//! the single indexer worker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::scanner::FileInfo;

/// Unbounded FIFO work queue with an async blocking `pop`.
///
/// `push` never blocks. `pop` parks until an item is available or the queue
/// has been stopped; after `stop`, remaining items are still drained and
/// then `pop` returns `None`. Safe for many producers; the reference
/// deployment uses exactly one consumer.
pub struct JobQueue {
    inner: Mutex<VecDeque<FileInfo>>,
    notify: Notify,
    stopped: AtomicBool,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn push(&self, info: FileInfo) {
        self.inner
            .lock()
            .expect("queue mutex poisoned")
            .push_back(info);
        self.notify.notify_one();
    }

    /// Removes the oldest item, waiting if the queue is empty. Returns
    /// `None` once the queue is stopped and drained.
    pub async fn pop(&self) -> Option<FileInfo> {
        loop {
            if let Some(item) = self.inner.lock().expect("queue mutex poisoned").pop_front() {
                return Some(item);
            }
            if self.stopped.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Wakes all waiters; subsequent pops return `None` once drained.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
        // Cover a consumer that checked the flag just before it was set and
        // is about to park: Notify stores a single permit.
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
