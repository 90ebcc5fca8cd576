//! Single-flight serialization of sync work.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Runs units of work one at a time, in submission order.
///
/// Each unit starts only after the previous one has finished, whether it
/// succeeded, failed or was cancelled. Units run on spawned tasks; dropping
/// the future returned by [`SerialTasks::add`] aborts the unit, including
/// any remote call it is awaiting, and lets its successor start.
#[derive(Default)]
pub struct SerialTasks {
    tail: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Aborts the unit's task unless it already completed.
struct AbortOnDrop(Option<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

impl SerialTasks {
    /// Creates an empty serializer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `work` behind every unit added before it and returns a future
    /// resolving to its result.
    ///
    /// The unit is queued when `add` is called, not when the returned
    /// future is first polled. Returns [`SyncError::Cancelled`] if the
    /// unit's task was aborted.
    pub fn add<F, T>(&self, work: F) -> impl Future<Output = SyncResult<T>> + Send + 'static
    where
        F: Future<Output = SyncResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let previous = self.tail.lock().replace(done_rx);

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                // An error only means the previous unit's task is gone
                let _ = previous.await;
            }
            let result = work.await;
            drop(done_tx);
            result
        });
        let mut guard = AbortOnDrop(Some(handle.abort_handle()));

        async move {
            let joined = handle.await;
            guard.0 = None;

            match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(SyncError::Cancelled),
                Err(e) => std::panic::resume_unwind(e.into_panic()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn units_run_in_submission_order() {
        let tasks = Arc::new(SerialTasks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let order = order.clone();
            // Later units sleep less, so only serialization keeps them ordered
            let unit = async move {
                tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                order.lock().push(i);
                Ok(i)
            };
            handles.push(tokio::spawn(tasks.add(unit)));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn units_never_overlap() {
        let tasks = Arc::new(SerialTasks::new());
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let running = running.clone();
            let max_running = max_running.clone();
            handles.push(tokio::spawn(tasks.add(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_does_not_block_successor() {
        let tasks = SerialTasks::new();
        let err = tasks
            .add(async { Err::<(), _>(SyncError::SetupFailed) })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SetupFailed));

        assert_eq!(tasks.add(async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn dropped_unit_is_aborted_and_successor_runs() {
        let tasks = Arc::new(SerialTasks::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let slow = {
            let finished = finished.clone();
            tasks.add(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        // Give up on the slow unit after it has started
        let timed_out = tokio::time::timeout(Duration::from_millis(20), slow).await;
        assert!(timed_out.is_err());

        let value = tokio::time::timeout(Duration::from_secs(5), tasks.add(async { Ok(1) }))
            .await
            .expect("successor should not wait for the aborted unit")
            .unwrap();
        assert_eq!(value, 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
