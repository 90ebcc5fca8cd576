//! Reference store configuration.

use std::time::Duration;

/// Configuration for a [`MemoryRecordStore`](crate::MemoryRecordStore).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of change-log entries returned per fetch page.
    pub page_size: usize,
    /// Maximum number of saves plus deletes accepted per batch.
    pub batch_limit: usize,
    /// Artificial delay applied to every call.
    pub latency: Option<Duration>,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            page_size: 100,
            batch_limit: 400,
            latency: None,
        }
    }

    /// Sets the fetch page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the batch limit.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Sets the per-call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
