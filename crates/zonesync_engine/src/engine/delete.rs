//! Delete pipeline and the pending deletion flush.

use super::SyncEngine;
use crate::error::{RetryOperation, SyncError, SyncResult};
use crate::local::LocalStore;
use crate::syncable::SyncModel;
use std::future::Future;
use std::sync::Arc;
use zonesync_protocol::{RecordId, RemoteError, RemoteErrorKind, RemoteStore, SavePolicy};

/// Per-id outcome of one batched delete.
#[derive(Debug, Default)]
struct DeleteOutcome {
    /// Deleted, or already absent.
    confirmed: Vec<String>,
    /// Failed with a retryable error.
    retryable: Vec<String>,
    /// First per-record failure.
    error: Option<RemoteError>,
}

impl<R: RemoteStore, L: LocalStore> SyncEngine<R, L> {
    /// Deletes records by id and returns the ids the store confirmed.
    ///
    /// When the network or the account is unavailable the ids are queued as
    /// a pending deletion and an empty list is returned. Ids that fail with
    /// a retryable error are queued as well and the error returned.
    pub fn delete(
        self: &Arc<Self>,
        ids: Vec<String>,
    ) -> impl Future<Output = SyncResult<Vec<String>>> + Send + 'static {
        self.serialize("delete", |engine| async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            if !engine.preconditions_met().await {
                engine.pending.add_pending_deletions(ids)?;
                return Ok(Vec::new());
            }
            if let Err(e) = engine.prepare_environment().await {
                engine.pending.add_pending_deletions(ids)?;
                return Err(e);
            }

            let outcome = match engine.delete_batch(&ids).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if e.remote().is_some_and(RemoteError::is_retryable)
                        || matches!(e, SyncError::RetriesExhausted { .. })
                    {
                        engine.pending.add_pending_deletions(ids)?;
                    }
                    return Err(e);
                }
            };

            engine.commit_deleted(&outcome.confirmed).await?;
            engine.pending.remove_pending_deletions(&outcome.confirmed)?;
            engine.pending.add_pending_deletions(outcome.retryable)?;
            match outcome.error {
                Some(e) => Err(SyncError::Remote(e)),
                None => Ok(outcome.confirmed),
            }
        })
    }

    /// Deletes the records of `models`.
    pub fn delete_models(
        self: &Arc<Self>,
        models: &[Box<dyn SyncModel>],
    ) -> impl Future<Output = SyncResult<Vec<String>>> + Send + 'static {
        self.delete(models.iter().map(|m| m.id().to_string()).collect())
    }

    /// Submits every queued deletion. Failures are logged and the ids stay
    /// queued until the local store has received them; a flush never fails
    /// the pass.
    pub(super) async fn process_pending_deletions(&self) {
        let ids = self.pending.pending_deletions();
        if ids.is_empty() {
            return;
        }
        tracing::info!(count = ids.len(), "processing pending deletions");

        let outcome = match self.delete_batch(&ids).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "pending deletions failed");
                return;
            }
        };
        if let Some(e) = &outcome.error {
            tracing::error!(error = %e, "some pending deletions failed");
        }

        // Undelivered ids stay queued; the next flush sees them as unknown items
        if let Err(e) = self.commit_deleted(&outcome.confirmed).await {
            tracing::error!(error = %e, "failed to deliver confirmed deletions");
            return;
        }
        if let Err(e) = self.pending.remove_pending_deletions(&outcome.confirmed) {
            tracing::error!(error = %e, "failed to update pending deletions");
        }
    }

    async fn delete_batch(&self, ids: &[String]) -> SyncResult<DeleteOutcome> {
        let record_ids: Vec<RecordId> = ids
            .iter()
            .map(|id| RecordId::new(id.clone(), self.zone_id.clone()))
            .collect();
        let count = record_ids.len();

        let response = self
            .retrier
            .run(RetryOperation::Deletion, || async {
                self.remote
                    .modify_records(Vec::new(), record_ids.clone(), SavePolicy::default())
                    .await
                    .map_err(|e| {
                        if e.kind == RemoteErrorKind::LimitExceeded {
                            SyncError::BatchTooLarge { count }
                        } else {
                            SyncError::Remote(e)
                        }
                    })
            })
            .await?;

        let mut outcome = DeleteOutcome::default();
        for (record_id, result) in response.delete_results {
            match result {
                Ok(()) => outcome.confirmed.push(record_id.record_name),
                Err(e) if e.is_unknown_item() => {
                    tracing::debug!(record = %record_id, "already deleted");
                    outcome.confirmed.push(record_id.record_name);
                }
                Err(e) => {
                    tracing::warn!(record = %record_id, error = %e, "record not deleted");
                    if e.is_retryable() {
                        outcome.retryable.push(record_id.record_name);
                    }
                    outcome.error.get_or_insert(e);
                }
            }
        }
        Ok(outcome)
    }

    async fn commit_deleted(&self, confirmed: &[String]) -> SyncResult<()> {
        if confirmed.is_empty() {
            return Ok(());
        }
        self.forget(confirmed);
        self.local.did_delete_models(confirmed.to_vec()).await?;
        self.stats.lock().records_deleted += confirmed.len() as u64;
        tracing::info!(count = confirmed.len(), "records deleted");
        Ok(())
    }
}
