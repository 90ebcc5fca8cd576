//! Bounded retry around remote calls.

use crate::config::RetryConfig;
use crate::error::{RetryOperation, SyncError, SyncResult};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Runs operations under a [`RetryConfig`], counting every retry.
///
/// Clones share the retry counter.
#[derive(Debug, Clone)]
pub struct Retrier {
    config: RetryConfig,
    retries: Arc<AtomicU64>,
}

impl Retrier {
    /// Creates a retrier.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retries: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Total number of retries performed so far.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached.
    ///
    /// Non-retryable errors are returned unchanged. A retryable error on the
    /// last attempt becomes [`SyncError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, operation: RetryOperation, mut op: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::warn!(%operation, attempt, error = %err, "retries exhausted");
                return Err(match err {
                    SyncError::Remote(source) => SyncError::RetriesExhausted {
                        operation,
                        attempts: attempt,
                        source,
                    },
                    other => other,
                });
            }

            let retry_after = err.remote().and_then(|e| e.retry_after);
            let delay = self.config.delay_after_failure(attempt, retry_after);
            tracing::debug!(
                %operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying"
            );
            self.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
        }
    }
}
