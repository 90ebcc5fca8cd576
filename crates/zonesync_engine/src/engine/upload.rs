//! Upload pipeline.

use super::SyncEngine;
use crate::error::{RetryOperation, SyncError, SyncResult};
use crate::local::LocalStore;
use crate::syncable::{ModelsByType, RecordContext, SyncModel};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use zonesync_protocol::{
    ModifyRecordsResult, Record, RemoteError, RemoteErrorKind, RemoteStore, SavePolicy,
};

/// A model being uploaded, with the buffer generation it was taken at.
struct Outgoing {
    model: Box<dyn SyncModel>,
    generation: u64,
}

/// State shared by the attempts of one upload.
#[derive(Default)]
struct UploadProgress {
    /// Records not yet confirmed, in submission order.
    remaining: Vec<Record>,
    /// Records the store confirmed.
    saved: Vec<Record>,
    /// Names of confirmed records that went through a resolver.
    resolved: HashSet<String>,
    /// Conflicts handed to a resolver.
    conflicts: u64,
}

impl<R: RemoteStore, L: LocalStore> SyncEngine<R, L> {
    /// Buffers `models` and uploads them.
    ///
    /// Buffering replaces models with the same id. When the network or the
    /// account is unavailable the models stay buffered, `Ok(())` is
    /// returned, and the next pass uploads them.
    pub fn upload(
        self: &Arc<Self>,
        models: Vec<Box<dyn SyncModel>>,
    ) -> impl Future<Output = SyncResult<()>> + Send + 'static {
        let outgoing: Vec<Outgoing> = {
            let mut buffer = self.buffer.lock();
            models
                .into_iter()
                .map(|model| {
                    let (model, generation) = buffer.insert(model);
                    Outgoing { model, generation }
                })
                .collect()
        };

        self.serialize("upload", |engine| async move {
            if !engine.preconditions_met().await {
                tracing::info!(count = outgoing.len(), "upload deferred");
                return Ok(());
            }
            engine.prepare_environment().await?;
            // An earlier unit may have confirmed or replaced these copies
            let outgoing: Vec<Outgoing> = {
                let buffer = engine.buffer.lock();
                outgoing
                    .into_iter()
                    .filter(|o| {
                        buffer.is_current(o.model.record_type(), o.model.id(), o.generation)
                    })
                    .collect()
            };
            engine.upload_models(outgoing).await
        })
    }

    /// Uploads every buffered model that was never synced.
    pub fn upload_local_data_not_uploaded_yet(
        self: &Arc<Self>,
    ) -> impl Future<Output = SyncResult<()>> + Send + 'static {
        self.serialize("upload", |engine| async move {
            if !engine.preconditions_met().await {
                return Ok(());
            }
            engine.prepare_environment().await?;
            engine.upload_buffered(true).await
        })
    }

    /// Uploads buffered models: every one, or only those never synced.
    pub(super) async fn upload_buffered(&self, never_synced_only: bool) -> SyncResult<()> {
        let outgoing: Vec<Outgoing> = self
            .buffer
            .lock()
            .snapshot(never_synced_only)
            .into_iter()
            .map(|(model, generation)| Outgoing { model, generation })
            .collect();
        if outgoing.is_empty() {
            return Ok(());
        }
        tracing::info!(count = outgoing.len(), never_synced_only, "uploading buffered models");
        self.upload_models(outgoing).await
    }

    async fn upload_models(&self, outgoing: Vec<Outgoing>) -> SyncResult<()> {
        if outgoing.is_empty() {
            return Ok(());
        }

        let ctx = RecordContext {
            zone_id: &self.zone_id,
            asset_staging_dir: &self.config.asset_staging_dir,
        };
        let mut records = Vec::with_capacity(outgoing.len());
        let mut convertible = Vec::with_capacity(outgoing.len());
        for o in outgoing {
            match o.model.to_record(&ctx) {
                Ok(record) => {
                    records.push(record);
                    convertible.push(o);
                }
                Err(e) => {
                    // Stays buffered for the next pass
                    tracing::warn!(
                        id = o.model.id(),
                        record_type = o.model.record_type(),
                        error = %e,
                        "skipping model"
                    );
                }
            }
        }
        let outgoing = convertible;
        if records.is_empty() {
            return Ok(());
        }
        let total = records.len();

        tracing::info!(zone = %self.zone_id, count = total, "uploading records");
        self.local.progress(0.0);

        let progress = Mutex::new(UploadProgress {
            remaining: records,
            ..UploadProgress::default()
        });
        let result = self
            .retrier
            .run(RetryOperation::Upload, || async {
                let batch = progress.lock().remaining.clone();
                if batch.is_empty() {
                    return Ok(());
                }
                let count = batch.len();
                let response = self
                    .remote
                    .modify_records(batch, Vec::new(), SavePolicy::IfServerRecordUnchanged)
                    .await
                    .map_err(|e| batch_error(e, count))?;
                let outcome = self.absorb_save_results(response, &progress).await;
                self.local
                    .progress(progress.lock().saved.len() as f64 / total as f64);
                outcome
            })
            .await;

        // Confirmed records are committed even when others failed
        let UploadProgress {
            saved,
            resolved,
            conflicts,
            ..
        } = std::mem::take(&mut *progress.lock());
        self.commit_uploaded(outgoing, saved, &resolved, conflicts)
            .await?;
        result
    }

    /// Moves confirmed records out of `progress.remaining`, resolving
    /// conflicts once, and returns the first error left over.
    async fn absorb_save_results(
        &self,
        response: ModifyRecordsResult,
        progress: &Mutex<UploadProgress>,
    ) -> SyncResult<()> {
        let mut resolved = Vec::new();
        let mut first_error: Option<SyncError> = None;

        for (record_id, outcome) in response.save_results {
            match outcome {
                Ok(saved) => self.confirm_saved(progress, saved),
                Err(e) => match e.conflict_data() {
                    Some(conflict) => {
                        let record_type = &conflict.client_record.record_type;
                        let codec = match self.registry.read().codec(record_type) {
                            Ok(codec) => codec,
                            Err(e) => {
                                first_error.get_or_insert(e);
                                continue;
                            }
                        };
                        tracing::info!(
                            record = %record_id,
                            %record_type,
                            "resolving conflict"
                        );
                        resolved.push(
                            codec.resolve_conflict(
                                &conflict.client_record,
                                &conflict.server_record,
                            ),
                        );
                    }
                    None => {
                        tracing::warn!(record = %record_id, error = %e, "record not saved");
                        // Prefer reporting a retryable failure so the batch is retried
                        if first_error.as_ref().map_or(true, |f| !f.is_retryable()) {
                            first_error = Some(SyncError::Remote(e));
                        }
                    }
                },
            }
        }

        if !resolved.is_empty() {
            progress.lock().conflicts += resolved.len() as u64;
            let count = resolved.len();
            let response = self
                .remote
                .modify_records(resolved, Vec::new(), SavePolicy::IfServerRecordUnchanged)
                .await
                .map_err(|e| batch_error(e, count))?;

            for (record_id, outcome) in response.save_results {
                match outcome {
                    Ok(saved) => {
                        progress
                            .lock()
                            .resolved
                            .insert(saved.record_name().to_string());
                        self.confirm_saved(progress, saved);
                    }
                    Err(e) if e.kind == RemoteErrorKind::ServerRecordChanged => {
                        tracing::error!(record = %record_id, "conflict persisted after resolution");
                        return Err(SyncError::ConflictUnresolved {
                            record_name: record_id.record_name,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            record = %record_id,
                            error = %e,
                            "resolved record not saved"
                        );
                        if first_error.as_ref().map_or(true, |f| !f.is_retryable()) {
                            first_error = Some(SyncError::Remote(e));
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn confirm_saved(&self, progress: &Mutex<UploadProgress>, saved: Record) {
        let mut progress = progress.lock();
        progress.remaining.retain(|r| r.id != saved.id);
        progress.saved.push(saved);
    }

    /// Captures metadata of confirmed records and hands the models to the
    /// local store in one call. Models whose record went through a resolver
    /// are rebuilt from the saved record.
    async fn commit_uploaded(
        &self,
        outgoing: Vec<Outgoing>,
        saved: Vec<Record>,
        resolved: &HashSet<String>,
        conflicts: u64,
    ) -> SyncResult<()> {
        if saved.is_empty() {
            return Ok(());
        }

        let saved: HashMap<String, Record> = saved
            .into_iter()
            .map(|record| (record.record_name().to_string(), record))
            .collect();
        let registry = self.registry.read().clone();
        let mut updated = ModelsByType::new();
        {
            let mut buffer = self.buffer.lock();
            let mut synced = self.synced.lock();
            for Outgoing {
                mut model,
                generation,
            } in outgoing
            {
                let Some(record) = saved.get(model.id()) else {
                    continue;
                };
                let metadata = record.system_fields().cloned();
                if let Some(metadata) = &metadata {
                    synced.insert(model.id().to_string(), metadata.clone());
                }
                model.set_sync_metadata(metadata);
                buffer.confirm(model.record_type(), model.id(), generation);
                if resolved.contains(model.id()) {
                    match registry.decode(record) {
                        Ok(merged) => model = merged,
                        Err(e) => {
                            tracing::warn!(
                                id = model.id(),
                                error = %e,
                                "failed to decode resolved record"
                            );
                        }
                    }
                }
                updated
                    .entry(model.record_type().to_string())
                    .or_default()
                    .push(model);
            }
        }

        let count = updated.values().map(Vec::len).sum::<usize>();
        {
            let mut stats = self.stats.lock();
            stats.records_uploaded += count as u64;
            stats.conflicts_resolved += conflicts;
        }
        tracing::info!(count, conflicts, "records uploaded");
        self.local.did_update_models(updated).await
    }
}

/// Maps a whole-batch failure. A batch over the provider limit is not
/// retried.
fn batch_error(error: RemoteError, count: usize) -> SyncError {
    if error.kind == RemoteErrorKind::LimitExceeded {
        SyncError::BatchTooLarge { count }
    } else {
        SyncError::Remote(error)
    }
}
