//! Background task tracking
//!
//! Handlers hand fire-and-forget work (such as sending a welcome email after
//! responding) to [`TaskTracker::launch`]. Shutdown calls
//! [`TaskTracker::wait`] so none of that work is cut off mid-flight.

use std::{
    any::Any,
    fmt::Display,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{error, Instrument, Span};

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    drained: Notify,
}

/// Counting barrier over detached tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskTracker {
    inner: Arc<Inner>,
}

/// Decrements the count when the task finishes, panics, or is dropped.
struct Completion(Arc<Inner>);

impl Drop for Completion {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` on the runtime without blocking the caller.
    ///
    /// Errors and panics are logged and reported, never propagated. The task
    /// inherits the caller's tracing span.
    #[allow(dead_code)]
    pub fn launch<F, E>(&self, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        let completion = Completion(Arc::clone(&self.inner));

        let task = async move {
            let _completion = completion;
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Background task failed");
                    sentry::capture_message(
                        &format!("background task failed: {e}"),
                        sentry::Level::Error,
                    );
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(panic = %message, "Background task panicked");
                    sentry::capture_message(
                        &format!("background task panicked: {message}"),
                        sentry::Level::Fatal,
                    );
                }
            }
        };

        tokio::spawn(task.instrument(Span::current()));
    }

    /// Number of launched tasks that have not finished.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Waits until every launched task has finished.
    pub async fn wait(&self) {
        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            // Register before checking so a notification between the load and
            // the await is not lost.
            drained.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            drained.await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_wait_with_nothing_launched_returns_immediately() {
        let tracker = TaskTracker::new();
        tokio::time::timeout(Duration::from_millis(50), tracker.wait())
            .await
            .expect("wait should return at once");
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_task_finishes() {
        let tracker = TaskTracker::new();
        let (release, gate) = oneshot::channel::<()>();
        let done = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&done);
        tracker.launch(async move {
            let _ = gate.await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, String>(())
        });
        assert_eq!(tracker.outstanding(), 1);

        let pending = tokio::time::timeout(Duration::from_millis(50), tracker.wait()).await;
        assert!(pending.is_err(), "wait returned while a task was running");

        release.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .unwrap();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_failed_task_is_contained() {
        let tracker = TaskTracker::new();
        tracker.launch(async { Err::<(), _>("smtp unavailable") });

        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .unwrap();
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let tracker = TaskTracker::new();
        let explode = true;
        tracker.launch(async move {
            assert!(!explode, "boom");
            Ok::<(), String>(())
        });

        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .unwrap();
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_tasks_drain() {
        let tracker = TaskTracker::new();
        let finished = Arc::new(AtomicUsize::new(0));

        for i in 0..100u64 {
            let finished = Arc::clone(&finished);
            tracker.launch(async move {
                tokio::time::sleep(Duration::from_millis(i % 10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                if i % 7 == 0 {
                    return Err(format!("task {i} failed"));
                }
                Ok(())
            });
        }

        tokio::time::timeout(Duration::from_secs(5), tracker.wait())
            .await
            .unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 100);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_count() {
        let tracker = TaskTracker::new();
        let clone = tracker.clone();
        let (release, gate) = oneshot::channel::<()>();

        clone.launch(async move {
            let _ = gate.await;
            Ok::<_, String>(())
        });
        assert_eq!(tracker.outstanding(), 1);

        release.send(()).unwrap();
        tracker.wait().await;
        assert_eq!(clone.outstanding(), 0);
    }

    #[test]
    fn test_panic_message_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic payload");
    }
}
