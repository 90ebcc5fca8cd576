//! The sync engine orchestrator.
//!
//! A pass runs in this order:
//!
//! 1. check preconditions (network reachable, account available)
//! 2. prepare the environment (zone, subscriptions), cached
//! 3. flush pending deletions
//! 4. upload buffered models
//! 5. fetch remote changes page by page
//!
//! Every public entry point is queued on one [`SerialTasks`], so no two
//! pipelines ever overlap.

mod delete;
mod fetch;
mod notifications;
mod upload;

use crate::config::SyncEngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::local::LocalStore;
use crate::middleware::{
    AccountStatusMiddleware, ApplicationState, ApplicationStateMiddleware,
    NetworkStatusMiddleware,
};
use crate::pending::PendingOperationsManager;
use crate::retry::Retrier;
use crate::serial::SerialTasks;
use crate::settings::{FileSettingsStore, SettingsStore, StateDir};
use crate::subscription::SubscriptionManager;
use crate::syncable::{SyncModel, Syncable, TypeRegistry};
use crate::token::TokenManager;
use crate::zone::ZoneManager;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use zonesync_protocol::{AccountStatus, RemoteStore, SystemFields, ZoneId};

/// Whether a sync pipeline is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing is running.
    Idle,
    /// A pass, upload, deletion or fetch is running.
    Loading,
}

impl SyncState {
    /// Returns true while a pipeline is running.
    pub fn is_loading(&self) -> bool {
        matches!(self, SyncState::Loading)
    }
}

/// Counters about the engine's work since it was created.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sync passes that ran to completion.
    pub passes_completed: u64,
    /// Sync passes skipped because a precondition did not hold.
    pub passes_skipped: u64,
    /// Records confirmed uploaded.
    pub records_uploaded: u64,
    /// Conflicts handed to a resolver.
    pub conflicts_resolved: u64,
    /// Change pages committed.
    pub pages_fetched: u64,
    /// Fetched records delivered to the local store.
    pub records_fetched: u64,
    /// Fetched records dropped as echoes of this client's uploads.
    pub echoes_skipped: u64,
    /// Deletions confirmed by the remote store.
    pub records_deleted: u64,
    /// Retries across every retryable operation.
    pub retries: u64,
    /// When the last pass completed.
    pub last_sync_time: Option<Instant>,
    /// Last error a pipeline returned.
    pub last_error: Option<String>,
}

/// A model waiting for upload confirmation.
struct BufferedModel {
    model: Box<dyn SyncModel>,
    generation: u64,
}

/// Models not yet confirmed synced, keyed by record type and id.
#[derive(Default)]
struct UploadBuffer {
    models: HashMap<(String, String), BufferedModel>,
    next_generation: u64,
}

impl UploadBuffer {
    /// Buffers a model, replacing an earlier version with the same id.
    fn insert(&mut self, model: Box<dyn SyncModel>) -> (Box<dyn SyncModel>, u64) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let key = (model.record_type().to_string(), model.id().to_string());
        let copy = model.clone();
        self.models.insert(key, BufferedModel { model, generation });
        (copy, generation)
    }

    /// Removes a model unless it was replaced after `generation`.
    fn confirm(&mut self, record_type: &str, id: &str, generation: u64) {
        let key = (record_type.to_string(), id.to_string());
        if self
            .models
            .get(&key)
            .is_some_and(|buffered| buffered.generation == generation)
        {
            self.models.remove(&key);
        }
    }

    /// Returns true while `generation` is the buffered version of the model.
    fn is_current(&self, record_type: &str, id: &str, generation: u64) -> bool {
        self.models
            .get(&(record_type.to_string(), id.to_string()))
            .is_some_and(|buffered| buffered.generation == generation)
    }

    fn remove_ids(&mut self, ids: &[String]) {
        self.models.retain(|(_, id), _| !ids.contains(id));
    }

    fn snapshot(&self, never_synced_only: bool) -> Vec<(Box<dyn SyncModel>, u64)> {
        let mut models: Vec<_> = self
            .models
            .values()
            .filter(|buffered| !never_synced_only || buffered.model.sync_metadata().is_none())
            .map(|buffered| (buffered.model.clone(), buffered.generation))
            .collect();
        models.sort_by_key(|(_, generation)| *generation);
        models
    }
}

/// Sets the state back to idle when a pipeline ends, however it ends.
struct LoadingGuard<'a> {
    tx: &'a watch::Sender<SyncState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.tx.send_replace(SyncState::Idle);
    }
}

/// Bidirectional sync between a [`LocalStore`] and a [`RemoteStore`].
///
/// # Example
///
/// ```rust,ignore
/// let engine = SyncEngine::new(config, remote, local)?;
/// engine.register::<Note>();
/// engine.start_monitoring();
///
/// engine.perform_sync().await?;
/// engine.upload(vec![Box::new(note)]).await?;
/// ```
pub struct SyncEngine<R: RemoteStore, L: LocalStore> {
    config: SyncEngineConfig,
    zone_id: ZoneId,
    remote: Arc<R>,
    local: Arc<L>,
    _state_dir: StateDir,
    tokens: TokenManager,
    zones: ZoneManager<R>,
    subscriptions: SubscriptionManager<R>,
    pending: PendingOperationsManager,
    network: Arc<NetworkStatusMiddleware>,
    account: AccountStatusMiddleware<R>,
    application: ApplicationStateMiddleware,
    serial: SerialTasks,
    retrier: Retrier,
    registry: RwLock<TypeRegistry>,
    buffer: Mutex<UploadBuffer>,
    synced: Mutex<HashMap<String, SystemFields>>,
    environment_checked_at: Mutex<Option<Instant>>,
    state_tx: watch::Sender<SyncState>,
    stats: Mutex<SyncStats>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: RemoteStore, L: LocalStore> SyncEngine<R, L> {
    /// Opens the state directory and creates an engine.
    ///
    /// Fails with [`SyncError::StateLocked`] if another engine holds the
    /// state directory.
    pub fn new(config: SyncEngineConfig, remote: Arc<R>, local: Arc<L>) -> SyncResult<Arc<Self>> {
        let state_dir = StateDir::open(&config.state_dir)?;
        let settings: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::open(&state_dir)?);
        let pending = PendingOperationsManager::open(&state_dir.pending_dir())?;
        let zone_id = config.zone_id();
        let retrier = Retrier::new(config.retry.clone());

        tracing::info!(
            container = %config.container_identifier,
            zone = %zone_id,
            state_dir = %config.state_dir.display(),
            "sync engine created"
        );

        let (state_tx, _) = watch::channel(SyncState::Idle);
        Ok(Arc::new(Self {
            tokens: TokenManager::new(settings.clone(), &zone_id.zone_name),
            zones: ZoneManager::new(
                remote.clone(),
                settings.clone(),
                zone_id.clone(),
                retrier.clone(),
            ),
            subscriptions: SubscriptionManager::new(
                remote.clone(),
                settings,
                zone_id.clone(),
                retrier.clone(),
            ),
            account: AccountStatusMiddleware::new(remote.clone(), retrier.clone()),
            network: Arc::new(NetworkStatusMiddleware::default()),
            application: ApplicationStateMiddleware::default(),
            pending,
            serial: SerialTasks::new(),
            retrier,
            registry: RwLock::new(TypeRegistry::new()),
            buffer: Mutex::new(UploadBuffer::default()),
            synced: Mutex::new(HashMap::new()),
            environment_checked_at: Mutex::new(None),
            state_tx,
            stats: Mutex::new(SyncStats::default()),
            monitors: Mutex::new(Vec::new()),
            _state_dir: state_dir,
            config,
            zone_id,
            remote,
            local,
        }))
    }

    /// Registers a model type. Its record type gets a subscription on the
    /// next environment check.
    pub fn register<T: Syncable>(&self) {
        let added = {
            let mut registry = self.registry.write();
            let added = !registry.contains(T::RECORD_TYPE);
            registry.register::<T>();
            added
        };
        if added {
            tracing::debug!(record_type = T::RECORD_TYPE, "record type registered");
            *self.environment_checked_at.lock() = None;
        }
    }

    /// Registered record types.
    pub fn record_types(&self) -> Vec<String> {
        self.registry.read().record_types()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// The zone this engine syncs.
    pub fn zone_id(&self) -> &ZoneId {
        &self.zone_id
    }

    /// The network middleware.
    pub fn network(&self) -> &Arc<NetworkStatusMiddleware> {
        &self.network
    }

    /// The account middleware.
    pub fn account(&self) -> &AccountStatusMiddleware<R> {
        &self.account
    }

    /// The application state middleware.
    pub fn application(&self) -> &ApplicationStateMiddleware {
        &self.application
    }

    /// The change token store.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// The zone manager.
    pub fn zones(&self) -> &ZoneManager<R> {
        &self.zones
    }

    /// The subscription manager.
    pub fn subscriptions(&self) -> &SubscriptionManager<R> {
        &self.subscriptions
    }

    /// The pending operations queue.
    pub fn pending(&self) -> &PendingOperationsManager {
        &self.pending
    }

    /// Current sync state.
    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Subscribes to sync state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> SyncStats {
        let mut stats = self.stats.lock().clone();
        stats.retries = self.retrier.retries();
        stats
    }

    /// Ids of buffered models, as (record type, id), in buffering order.
    pub fn buffered(&self) -> Vec<(String, String)> {
        self.buffer
            .lock()
            .snapshot(false)
            .into_iter()
            .map(|(model, _)| (model.record_type().to_string(), model.id().to_string()))
            .collect()
    }

    /// Seeds the upload buffer from [`LocalStore::fetch_unsynced`] for every
    /// registered record type. Returns how many models were buffered.
    pub async fn load_unsynced_from_store(&self) -> SyncResult<usize> {
        let mut count = 0;
        for record_type in self.record_types() {
            let models = self.local.fetch_unsynced(&record_type).await?;
            tracing::debug!(%record_type, count = models.len(), "loaded unsynced models");
            count += models.len();
            let mut buffer = self.buffer.lock();
            for model in models {
                buffer.insert(model);
            }
        }
        Ok(count)
    }

    /// Runs a full sync pass.
    ///
    /// Returns `Ok(())` without doing anything when the network or the
    /// account is unavailable. The pass is queued when this is called.
    pub fn perform_sync(self: &Arc<Self>) -> impl Future<Output = SyncResult<()>> + Send + 'static {
        self.serialize("sync", |engine| async move { engine.sync_pass().await })
    }

    /// Starts one consumer task per middleware. A transition to a favorable
    /// value queues a sync pass:
    ///
    /// - network: unavailable to available
    /// - account: the last known unavailable status to available
    /// - application: background to active
    ///
    /// Calling this twice has no effect.
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut monitors = self.monitors.lock();
        if !monitors.is_empty() {
            return;
        }

        let weak = Arc::downgrade(self);
        monitors.push(spawn_monitor(
            weak.clone(),
            self.network.subscribe(),
            "network",
            |previous, current| !*previous && *current,
            |_| true,
        ));
        monitors.push(spawn_monitor(
            weak.clone(),
            self.account.subscribe(),
            "account",
            |previous: &AccountStatus, current: &AccountStatus| {
                current.is_available()
                    && !previous.is_available()
                    && *previous != AccountStatus::CouldNotDetermine
            },
            // A failed refresh does not replace the last known status
            |current| *current != AccountStatus::CouldNotDetermine,
        ));
        monitors.push(spawn_monitor(
            weak,
            self.application.subscribe(),
            "application",
            |previous, current| {
                *previous == ApplicationState::Background && *current == ApplicationState::Active
            },
            |_| true,
        ));
        tracing::info!("environment monitoring started");
    }

    /// Stops the monitor tasks.
    pub fn stop_monitoring(&self) {
        let monitors: Vec<_> = self.monitors.lock().drain(..).collect();
        if monitors.is_empty() {
            return;
        }
        for monitor in monitors {
            monitor.abort();
        }
        tracing::info!("environment monitoring stopped");
    }

    /// Returns true while monitor tasks are running.
    pub fn is_monitoring(&self) -> bool {
        !self.monitors.lock().is_empty()
    }

    /// Queues `work` on the serializer, with the state set to loading
    /// while it runs.
    fn serialize<T, F, Fut>(
        self: &Arc<Self>,
        name: &'static str,
        work: F,
    ) -> impl Future<Output = SyncResult<T>> + Send + 'static
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(self);
        let work = work(Arc::clone(self));
        self.serial.add(async move {
            let _loading = engine.begin_loading();
            let result = work.await;
            if let Err(e) = &result {
                tracing::warn!(pipeline = name, error = %e, "sync pipeline failed");
                engine.after_failure(e);
            }
            result
        })
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        self.state_tx.send_replace(SyncState::Loading);
        LoadingGuard { tx: &self.state_tx }
    }

    fn after_failure(&self, error: &SyncError) {
        self.stats.lock().last_error = Some(error.to_string());
        if error.remote().is_some_and(|e| e.is_zone_deleted()) {
            tracing::warn!(zone = %self.zone_id, "zone is gone, next pass recreates it");
            *self.environment_checked_at.lock() = None;
            if let Err(e) = self.zones.reset() {
                tracing::error!(error = %e, "failed to reset zone flag");
            }
        }
    }

    async fn sync_pass(&self) -> SyncResult<()> {
        tracing::info!(zone = %self.zone_id, "sync pass started");
        if !self.preconditions_met().await {
            self.stats.lock().passes_skipped += 1;
            return Ok(());
        }

        self.prepare_environment().await?;
        self.process_pending_deletions().await;
        self.upload_buffered(false).await?;
        self.fetch_changes().await?;

        let mut stats = self.stats.lock();
        stats.passes_completed += 1;
        stats.last_sync_time = Some(Instant::now());
        tracing::info!(zone = %self.zone_id, "sync pass completed");
        Ok(())
    }

    /// Network reachable (cached) and account available (refreshed).
    async fn preconditions_met(&self) -> bool {
        if !self.network.is_available() {
            tracing::info!("network unavailable, skipping");
            return false;
        }
        match self.account.refresh_status().await {
            Ok(status) if status.is_available() => true,
            Ok(status) => {
                tracing::info!(?status, "account unavailable, skipping");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "account status unknown, skipping");
                false
            }
        }
    }

    async fn prepare_environment(&self) -> SyncResult<()> {
        let interval = self.config.environment_check_interval;
        let due = match *self.environment_checked_at.lock() {
            Some(checked_at) => checked_at.elapsed() >= interval,
            None => true,
        };
        if !due {
            return Ok(());
        }

        tracing::info!(zone = %self.zone_id, "preparing cloud environment");
        if !self.zones.create_custom_zone_if_needed().await? {
            return Err(SyncError::SetupFailed);
        }

        let record_types = self.record_types();
        if !record_types.is_empty() && self.subscriptions.registry()?.is_empty() {
            if let Err(e) = self.subscriptions.reconcile(&record_types).await {
                tracing::warn!(error = %e, "failed to reconcile subscriptions");
            }
        }
        if !self
            .subscriptions
            .create_private_subscriptions_if_needed(&record_types)
            .await?
        {
            return Err(SyncError::SetupFailed);
        }

        *self.environment_checked_at.lock() = Some(Instant::now());
        Ok(())
    }
}

impl<R: RemoteStore, L: LocalStore> Drop for SyncEngine<R, L> {
    fn drop(&mut self) {
        for monitor in self.monitors.get_mut().drain(..) {
            monitor.abort();
        }
    }
}

/// Runs a sync pass whenever `trigger(previous, current)` holds for a
/// published value.
fn spawn_monitor<R, L, V>(
    engine: Weak<SyncEngine<R, L>>,
    mut rx: watch::Receiver<V>,
    signal: &'static str,
    trigger: fn(&V, &V) -> bool,
    remember: fn(&V) -> bool,
) -> JoinHandle<()>
where
    R: RemoteStore,
    L: LocalStore,
    V: Clone + Send + Sync + 'static,
{
    let mut previous = rx.borrow_and_update().clone();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().clone();
            let fire = trigger(&previous, &current);
            if remember(&current) {
                previous = current;
            }
            if !fire {
                continue;
            }

            let Some(engine) = engine.upgrade() else {
                break;
            };
            tracing::info!(signal, "environment became favorable, syncing");
            let sync = engine.perform_sync();
            drop(engine);
            if let Err(e) = sync.await {
                tracing::warn!(signal, error = %e, "triggered sync failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonesync_protocol::{Record, RecordId};

    #[derive(Debug, Clone)]
    struct Item {
        id: String,
        metadata: Option<SystemFields>,
    }

    impl Syncable for Item {
        const RECORD_TYPE: &'static str = "Item";

        fn id(&self) -> &str {
            &self.id
        }

        fn sync_metadata(&self) -> Option<&SystemFields> {
            self.metadata.as_ref()
        }

        fn set_sync_metadata(&mut self, metadata: Option<SystemFields>) {
            self.metadata = metadata;
        }

        fn to_record(&self, ctx: &crate::syncable::RecordContext<'_>) -> SyncResult<Record> {
            Ok(Record::with_system_fields(
                Self::RECORD_TYPE,
                RecordId::new(self.id.clone(), ctx.zone_id.clone()),
                self.metadata.clone(),
            ))
        }

        fn from_record(record: &Record) -> SyncResult<Self> {
            Ok(Self {
                id: record.record_name().to_string(),
                metadata: record.system_fields().cloned(),
            })
        }
    }

    fn item(id: &str, synced: bool) -> Box<dyn SyncModel> {
        Box::new(Item {
            id: id.to_string(),
            metadata: synced.then(|| SystemFields::from_bytes(vec![1])),
        })
    }

    #[test]
    fn buffer_replaces_same_id() {
        let mut buffer = UploadBuffer::default();
        buffer.insert(item("a", false));
        buffer.insert(item("b", true));
        buffer.insert(item("a", true));

        let all = buffer.snapshot(false);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0.id(), "b");
        assert_eq!(all[1].0.id(), "a");
        assert!(buffer.snapshot(true).is_empty());
    }

    #[test]
    fn confirm_keeps_newer_version() {
        let mut buffer = UploadBuffer::default();
        let (_, first) = buffer.insert(item("a", false));
        let (_, second) = buffer.insert(item("a", false));

        buffer.confirm("Item", "a", first);
        assert_eq!(buffer.snapshot(false).len(), 1);

        buffer.confirm("Item", "a", second);
        assert!(buffer.snapshot(false).is_empty());
    }

    #[test]
    fn only_the_latest_unconfirmed_generation_is_current() {
        let mut buffer = UploadBuffer::default();
        let (_, first) = buffer.insert(item("a", false));
        let (_, second) = buffer.insert(item("a", false));
        assert!(!buffer.is_current("Item", "a", first));
        assert!(buffer.is_current("Item", "a", second));

        buffer.confirm("Item", "a", second);
        assert!(!buffer.is_current("Item", "a", second));
    }

    #[test]
    fn remove_ids_spans_types() {
        let mut buffer = UploadBuffer::default();
        buffer.insert(item("a", false));
        buffer.insert(item("b", false));
        buffer.remove_ids(&["a".to_string()]);

        let left = buffer.snapshot(false);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0.id(), "b");
    }

    #[test]
    fn sync_state_flags() {
        assert!(SyncState::Loading.is_loading());
        assert!(!SyncState::Idle.is_loading());
    }
}
