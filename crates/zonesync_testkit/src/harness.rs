//! Engine harness and polling helpers.

use crate::fixtures::{Folder, Note};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zonesync_engine::{MemoryLocalStore, RetryConfig, SyncEngine, SyncEngineConfig};
use zonesync_protocol::{RecordId, ZoneId};
use zonesync_server::{MemoryRecordStore, ServerConfig};

/// Container identifier used by the harness.
pub const TEST_CONTAINER: &str = "iCloud.com.example.notes";

/// Zone name used by the harness.
pub const TEST_ZONE: &str = "Notes";

/// The engine type the harness builds.
pub type TestSyncEngine = SyncEngine<MemoryRecordStore, MemoryLocalStore>;

/// Retry policy with millisecond delays, so failure tests stay fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new(3)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_jitter(false)
}

/// An engine wired to in-memory stores, with its state in a temp dir.
///
/// `Note` and `Folder` are registered.
pub struct TestEngine {
    /// The engine.
    pub engine: Arc<TestSyncEngine>,
    /// The remote store.
    pub remote: Arc<MemoryRecordStore>,
    /// The local store.
    pub local: Arc<MemoryLocalStore>,
    temp_dir: TempDir,
}

impl TestEngine {
    /// Creates a harness with a default remote store.
    pub fn new() -> Self {
        Self::with_remote(Arc::new(MemoryRecordStore::default()))
    }

    /// Creates a harness whose remote store uses `config`.
    pub fn with_server_config(config: ServerConfig) -> Self {
        Self::with_remote(Arc::new(MemoryRecordStore::new(config)))
    }

    /// Creates a harness against an existing remote store, as a second
    /// device would.
    pub fn with_remote(remote: Arc<MemoryRecordStore>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let local = Arc::new(MemoryLocalStore::new());
        let engine = open_engine(&temp_dir, remote.clone(), local.clone());
        Self {
            engine,
            remote,
            local,
            temp_dir,
        }
    }

    /// Drops the engine and opens a new one on the same state directory and
    /// stores, as an app restart would.
    pub fn restart(self) -> Self {
        let Self {
            engine,
            remote,
            local,
            temp_dir,
        } = self;
        engine.stop_monitoring();
        drop(engine);
        let engine = open_engine(&temp_dir, remote.clone(), local.clone());
        Self {
            engine,
            remote,
            local,
            temp_dir,
        }
    }

    /// The engine configuration used by the harness.
    pub fn config(&self) -> SyncEngineConfig {
        config_for(&self.temp_dir)
    }

    /// The zone the harness syncs.
    pub fn zone_id(&self) -> ZoneId {
        ZoneId::new(TEST_ZONE, None)
    }

    /// The record id of a model id in the harness zone.
    pub fn record_id(&self, id: &str) -> RecordId {
        RecordId::new(id, self.zone_id())
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn config_for(temp_dir: &TempDir) -> SyncEngineConfig {
    SyncEngineConfig::new(TEST_CONTAINER, TEST_ZONE)
        .with_state_dir(temp_dir.path().join("state"))
        .with_retry(fast_retry())
}

fn open_engine(
    temp_dir: &TempDir,
    remote: Arc<MemoryRecordStore>,
    local: Arc<MemoryLocalStore>,
) -> Arc<TestSyncEngine> {
    let engine =
        SyncEngine::new(config_for(temp_dir), remote, local).expect("failed to open sync engine");
    engine.register::<Note>();
    engine.register::<Folder>();
    engine
}

/// Polls `condition` every few milliseconds until it holds.
///
/// Returns false if it still does not hold after `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Like [`wait_until`], for async conditions.
pub async fn wait_until_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Installs a test log subscriber honoring `RUST_LOG`. Safe to call more
/// than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
