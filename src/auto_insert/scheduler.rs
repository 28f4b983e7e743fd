//! Per-document debouncing of auto-insert work.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::Url;

struct PendingTask {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PendingTask {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.handle.abort();
    }
}

/// Holds at most one delayed task per document.
///
/// Scheduling for a document cancels whatever was pending for it. Dropping
/// the scheduler cancels everything.
#[derive(Default)]
pub struct AutoInsertScheduler {
    pending: DashMap<Url, PendingTask>,
}

impl AutoInsertScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` for `uri` after `delay`, unless cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, uri: Url, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if flag.load(Ordering::SeqCst) {
                return;
            }
            task.await;
        });

        if let Some(previous) = self.pending.insert(uri, PendingTask { cancelled, handle }) {
            previous.cancel();
        }
    }

    /// Cancel the pending task for `uri`. Returns whether one was still running.
    pub fn cancel(&self, uri: &Url) -> bool {
        match self.pending.remove(uri) {
            Some((_, task)) => {
                let running = !task.handle.is_finished();
                task.cancel();
                running
            }
            None => false,
        }
    }

    /// Whether a task for `uri` is waiting or running.
    pub fn is_pending(&self, uri: &Url) -> bool {
        self.pending
            .get(uri)
            .is_some_and(|task| !task.handle.is_finished())
    }
}

impl Drop for AutoInsertScheduler {
    fn drop(&mut self) {
        for task in self.pending.iter() {
            task.cancel();
        }
    }
}

impl std::fmt::Debug for AutoInsertScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoInsertScheduler")
            .field("pending", &self.pending.len())
            .finish()
    }
}
