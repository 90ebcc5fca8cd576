//! Incremental fetch loop.

use super::SyncEngine;
use crate::error::{RetryOperation, SyncError, SyncResult};
use crate::local::LocalStore;
use crate::syncable::ModelsByType;
use std::future::Future;
use std::sync::Arc;
use zonesync_protocol::{RemoteErrorKind, RemoteStore, ZoneChanges};

impl<R: RemoteStore, L: LocalStore> SyncEngine<R, L> {
    /// Fetches remote changes since the stored change token.
    ///
    /// Skipped when the network or the account is unavailable.
    pub fn fetch_remote_changes(
        self: &Arc<Self>,
    ) -> impl Future<Output = SyncResult<()>> + Send + 'static {
        self.serialize("fetch", |engine| async move {
            if !engine.preconditions_met().await {
                return Ok(());
            }
            engine.fetch_changes().await
        })
    }

    /// Requests pages until the store reports no more, committing each page
    /// and its token before asking for the next.
    ///
    /// An expired token is cleared and the fetch restarts from scratch once.
    pub(super) async fn fetch_changes(&self) -> SyncResult<()> {
        let mut restarted = false;
        loop {
            let token = self.tokens.change_token()?;
            tracing::debug!(zone = %self.zone_id, has_token = token.is_some(), "fetching changes");

            let fetched = self
                .retrier
                .run(RetryOperation::Fetch, || async {
                    self.remote
                        .record_zone_changes(&self.zone_id, token.as_ref())
                        .await
                        .map_err(SyncError::from)
                })
                .await;

            let page = match fetched {
                Ok(page) => page,
                Err(SyncError::Remote(e))
                    if e.kind == RemoteErrorKind::ChangeTokenExpired && !restarted =>
                {
                    tracing::warn!(
                        zone = %self.zone_id,
                        "change token expired, refetching everything"
                    );
                    restarted = true;
                    self.tokens.clear()?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let more_coming = page.more_coming;
            self.commit_page(page).await?;
            if !more_coming {
                return Ok(());
            }
        }
    }

    /// Delivers one page to the local store, then persists its token.
    async fn commit_page(&self, page: ZoneChanges) -> SyncResult<()> {
        let ZoneChanges {
            modifications,
            deletions,
            change_token,
            ..
        } = page;
        let registry = self.registry.read().clone();

        let mut updates = ModelsByType::new();
        let mut fetched = 0u64;
        let mut echoes = 0u64;
        for record in modifications {
            let name = record.record_name().to_string();
            let is_echo = match (self.synced.lock().get(&name), record.system_fields()) {
                (Some(known), Some(fields)) => known == fields,
                _ => false,
            };
            if is_echo {
                tracing::trace!(record = %record.id, "skipping echo of own upload");
                echoes += 1;
                continue;
            }

            match registry.decode(&record) {
                Ok(model) => {
                    if let Some(fields) = record.system_fields() {
                        self.synced.lock().insert(name, fields.clone());
                    }
                    fetched += 1;
                    updates
                        .entry(record.record_type.clone())
                        .or_default()
                        .push(model);
                }
                Err(e) => {
                    tracing::warn!(
                        record = %record.id,
                        record_type = %record.record_type,
                        error = %e,
                        "skipping record"
                    );
                }
            }
        }

        let deleted: Vec<String> = deletions
            .into_iter()
            .map(|d| d.record_id.record_name)
            .collect();
        if !deleted.is_empty() {
            self.forget(&deleted);
        }

        tracing::debug!(
            zone = %self.zone_id,
            updated = fetched,
            deleted = deleted.len(),
            echoes,
            "committing page"
        );
        if !updates.is_empty() {
            self.local.did_update_models(updates).await?;
        }
        let deleted_count = deleted.len() as u64;
        if !deleted.is_empty() {
            self.local.did_delete_models(deleted).await?;
        }
        self.tokens.set_change_token(Some(&change_token))?;

        let mut stats = self.stats.lock();
        stats.pages_fetched += 1;
        stats.records_fetched += fetched + deleted_count;
        stats.echoes_skipped += echoes;
        Ok(())
    }

    /// Drops deleted ids from the buffer and the synced snapshot.
    pub(super) fn forget(&self, ids: &[String]) {
        self.buffer.lock().remove_ids(ids);
        let mut synced = self.synced.lock();
        for id in ids {
            synced.remove(id);
        }
    }
}
