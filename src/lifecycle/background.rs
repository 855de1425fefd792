//! Fire-and-forget background tasks.
//!
//! Best-effort: a spawned task may still be running when the response that
//! scheduled it has been sent, and nothing about its outcome is observable to
//! that request. The in-flight count only serves the shutdown drain.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Registry for background work outliving a request.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

/// Decrements the in-flight count even if the task panics.
struct InFlight(Arc<Inner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` without waiting for it.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlight(self.inner.clone());
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
            tracing::trace!(task = name, "Background task finished");
        });
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no task is running, or the deadline passes.
    /// Returns true when everything finished in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let idle = self.inner.idle.notified();
                if self.in_flight() == 0 {
                    return;
                }
                idle.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn test_spawn_does_not_block_and_drains() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        tasks.spawn("test", async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(tasks.in_flight(), 1);
        assert!(!done.load(Ordering::SeqCst));

        assert!(tasks.drain(Duration::from_secs(2)).await);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("slow", tokio::time::sleep(Duration::from_secs(10)));

        assert!(!tasks.drain(Duration::from_millis(20)).await);
        assert_eq!(tasks.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_drain_when_idle() {
        assert!(BackgroundTasks::new().drain(Duration::from_millis(1)).await);
    }
}
