//! Best-effort background work.
//!
//! A best-effort task is a side effect whose failure must never reach the
//! page: it is logged at `warn` and counted in
//! [`BACKGROUND_FAILURES_TOTAL`](crate::telemetry::BACKGROUND_FAILURES_TOTAL),
//! then dropped.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, timeout_at};
use tracing::warn;

use crate::Result;
use crate::telemetry;

/// Spawn `future` on the current runtime, logging instead of propagating its error.
pub fn spawn_best_effort<F, T>(task: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = future.await {
            metrics::counter!(telemetry::BACKGROUND_FAILURES_TOTAL, "task" => task).increment(1);
            warn!(task, error = %e, "background task failed");
        }
    })
}

/// Handles to in-flight best-effort tasks, so callers can wait for them.
#[derive(Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a best-effort task and keep its handle.
    pub fn spawn<F, T>(&self, task: &'static str, future: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = spawn_best_effort(task, future);
        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }

    /// Number of tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.handles
            .lock()
            .map(|handles| handles.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Wait until every task spawned so far (and any spawned meanwhile) has finished.
    pub async fn settle(&self) {
        loop {
            let drained = self.take();
            if drained.is_empty() {
                return;
            }
            for handle in drained {
                // A panicked task has already been reported by the runtime.
                let _ = handle.await;
            }
        }
    }

    /// Like [`settle()`](Self::settle), but gives up after `limit`.
    ///
    /// Tasks still running at the deadline are aborted. Returns `true` when
    /// every task finished in time.
    pub async fn settle_for(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let drained = self.take();
            if drained.is_empty() {
                return true;
            }
            let aborts: Vec<AbortHandle> = drained.iter().map(|h| h.abort_handle()).collect();
            if timeout_at(deadline, join_all(drained)).await.is_err() {
                let mut abandoned: Vec<AbortHandle> =
                    aborts.into_iter().filter(|h| !h.is_finished()).collect();
                abandoned.extend(self.take().iter().map(|h| h.abort_handle()));
                warn!(
                    abandoned = abandoned.len(),
                    ?limit,
                    "background tasks still running, aborting"
                );
                for handle in abandoned {
                    handle.abort();
                }
                return false;
            }
        }
    }

    fn take(&self) -> Vec<JoinHandle<()>> {
        match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AstralError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn failure_is_swallowed() {
        let handle = spawn_best_effort("test", async {
            Err::<(), _>(AstralError::Storage("quota exceeded".into()))
        });
        // The task itself completes normally.
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn settle_waits_for_all() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            tasks.spawn("count", async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AstralError>(())
            });
        }
        tasks.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn settle_for_aborts_stragglers() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));
        {
            let done = done.clone();
            tasks.spawn("quick", async move {
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AstralError>(())
            });
        }
        tasks.spawn("stalled", std::future::pending::<Result<()>>());

        assert!(!tasks.settle_for(Duration::from_millis(50)).await);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.pending(), 0);
        // Nothing left to wait on.
        assert!(tasks.settle_for(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn settle_for_returns_true_when_all_finish() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("sleep", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, AstralError>(())
        });
        assert!(tasks.settle_for(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn settle_on_empty_returns() {
        BackgroundTasks::new().settle().await;
    }
}
