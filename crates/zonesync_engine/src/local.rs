//! Local persistent store contract.

use crate::error::{SyncError, SyncResult};
use crate::syncable::{ModelsByType, SyncModel, Syncable};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// The local store the engine reconciles with the remote store.
///
/// The engine never reads or writes the local schema directly: it asks for
/// models that still need uploading and reports the results of every pass.
#[async_trait]
pub trait LocalStore: Send + Sync + 'static {
    /// Returns the models of `record_type` that were never uploaded or were
    /// changed since their last upload.
    async fn fetch_unsynced(&self, record_type: &str) -> SyncResult<Vec<Box<dyn SyncModel>>>;

    /// Receives models that were uploaded (with fresh sync metadata) or
    /// fetched from the remote store, grouped by record type.
    async fn did_update_models(&self, models: ModelsByType) -> SyncResult<()>;

    /// Receives the ids of models deleted remotely or whose deletion was
    /// confirmed.
    async fn did_delete_models(&self, ids: Vec<String>) -> SyncResult<()>;

    /// Receives upload progress as a fraction between 0 and 1.
    fn progress(&self, fraction: f64) {
        let _ = fraction;
    }
}

#[derive(Default)]
struct MemoryState {
    models: BTreeMap<(String, String), Box<dyn SyncModel>>,
    update_batches: Vec<BTreeMap<String, Vec<String>>>,
    delete_batches: Vec<Vec<String>>,
    progress: Vec<f64>,
    failing_deletes: usize,
}

/// In-memory local store for testing.
///
/// Records every callback so tests can assert on batching.
#[derive(Default)]
pub struct MemoryLocalStore {
    state: RwLock<MemoryState>,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a model as the application would.
    pub fn insert<T: Syncable>(&self, model: T) {
        let key = (T::RECORD_TYPE.to_string(), Syncable::id(&model).to_string());
        self.state.write().models.insert(key, Box::new(model));
    }

    /// Returns a stored model.
    pub fn get<T: Syncable>(&self, id: &str) -> Option<T> {
        self.state
            .read()
            .models
            .get(&(T::RECORD_TYPE.to_string(), id.to_string()))
            .and_then(|model| model.downcast_ref::<T>().cloned())
    }

    /// Returns every stored model of `T`, ordered by id.
    pub fn all<T: Syncable>(&self) -> Vec<T> {
        self.state
            .read()
            .models
            .iter()
            .filter(|((record_type, _), _)| record_type == T::RECORD_TYPE)
            .filter_map(|(_, model)| model.downcast_ref::<T>().cloned())
            .collect()
    }

    /// Number of stored models.
    pub fn len(&self) -> usize {
        self.state.read().models.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.state.read().models.is_empty()
    }

    /// Every `did_update_models` call, as record type to ids.
    pub fn update_batches(&self) -> Vec<BTreeMap<String, Vec<String>>> {
        self.state.read().update_batches.clone()
    }

    /// Every `did_delete_models` call.
    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        self.state.read().delete_batches.clone()
    }

    /// Makes the next `count` calls to `did_delete_models` fail without
    /// removing anything.
    pub fn fail_deletes(&self, count: usize) {
        self.state.write().failing_deletes = count;
    }

    /// Every progress report.
    pub fn progress_reports(&self) -> Vec<f64> {
        self.state.read().progress.clone()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn fetch_unsynced(&self, record_type: &str) -> SyncResult<Vec<Box<dyn SyncModel>>> {
        Ok(self
            .state
            .read()
            .models
            .iter()
            .filter(|((t, _), model)| t == record_type && model.sync_metadata().is_none())
            .map(|(_, model)| model.clone())
            .collect())
    }

    async fn did_update_models(&self, models: ModelsByType) -> SyncResult<()> {
        let mut state = self.state.write();
        let mut batch = BTreeMap::new();
        for (record_type, models) in models {
            let ids: Vec<String> = models.iter().map(|m| m.id().to_string()).collect();
            for model in models {
                let key = (record_type.clone(), model.id().to_string());
                state.models.insert(key, model);
            }
            batch.insert(record_type, ids);
        }
        state.update_batches.push(batch);
        Ok(())
    }

    async fn did_delete_models(&self, ids: Vec<String>) -> SyncResult<()> {
        let mut state = self.state.write();
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(SyncError::local_store("delete rejected"));
        }
        state.models.retain(|(_, id), _| !ids.contains(id));
        state.delete_batches.push(ids);
        Ok(())
    }

    fn progress(&self, fraction: f64) {
        self.state.write().progress.push(fraction);
    }
}
