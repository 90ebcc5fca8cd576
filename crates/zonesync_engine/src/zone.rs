//! Custom zone provisioning.

use crate::error::{RetryOperation, SyncError, SyncResult};
use crate::retry::Retrier;
use crate::settings::{zone_created_key, SettingsStore};
use std::sync::Arc;
use zonesync_protocol::{RemoteStore, ZoneId};

/// Creates the custom zone once and verifies it on later passes.
pub struct ZoneManager<R: RemoteStore> {
    remote: Arc<R>,
    settings: Arc<dyn SettingsStore>,
    zone_id: ZoneId,
    key: String,
    retrier: Retrier,
}

impl<R: RemoteStore> ZoneManager<R> {
    /// Creates a zone manager.
    pub fn new(
        remote: Arc<R>,
        settings: Arc<dyn SettingsStore>,
        zone_id: ZoneId,
        retrier: Retrier,
    ) -> Self {
        let key = zone_created_key(&zone_id.zone_name);
        Self {
            remote,
            settings,
            zone_id,
            key,
            retrier,
        }
    }

    /// Returns true if the zone was created by a previous pass.
    pub fn is_zone_created(&self) -> SyncResult<bool> {
        self.settings.get_flag(&self.key)
    }

    /// Forgets that the zone was created. The next pass recreates it.
    pub fn reset(&self) -> SyncResult<()> {
        self.settings.remove(&self.key)
    }

    /// Makes sure the custom zone exists.
    ///
    /// If the zone was created before, it is fetched to confirm it still
    /// exists; a zone the server no longer knows about is recreated. Any
    /// other failure is returned after the retry budget is spent.
    pub async fn create_custom_zone_if_needed(&self) -> SyncResult<bool> {
        tracing::info!(zone = %self.zone_id, "setting up zone");

        if self.is_zone_created()? {
            tracing::debug!(zone = %self.zone_id, "zone already created, verifying");
            match self
                .retrier
                .run(RetryOperation::ZoneCheck, || async {
                    self.remote.fetch_zone(&self.zone_id)
                        .await
                        .map_err(SyncError::from)
                })
                .await
            {
                Ok(_) => {
                    tracing::info!(zone = %self.zone_id, "zone verified");
                    return Ok(true);
                }
                Err(SyncError::Remote(e)) if e.is_zone_deleted() => {
                    tracing::warn!(
                        zone = %self.zone_id,
                        error = %e,
                        "zone no longer exists, recreating"
                    );
                    self.settings.set_flag(&self.key, false)?;
                }
                Err(e) => return Err(e),
            }
        }

        self.retrier
            .run(RetryOperation::ZoneCreation, || async {
                self.remote.save_zone(&self.zone_id)
                    .await
                    .map_err(SyncError::from)
            })
            .await?;
        self.settings.set_flag(&self.key, true)?;
        tracing::info!(zone = %self.zone_id, "zone created");

        self.is_zone_created()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::settings::MemorySettingsStore;
    use std::time::Duration;
    use zonesync_protocol::{RemoteError, RemoteErrorKind};
    use zonesync_server::{MemoryRecordStore, StoreMethod};

    fn manager(remote: Arc<MemoryRecordStore>) -> ZoneManager<MemoryRecordStore> {
        let retrier = Retrier::new(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        );
        ZoneManager::new(
            remote,
            Arc::new(MemorySettingsStore::new()),
            ZoneId::new("Notes", None),
            retrier,
        )
    }

    #[tokio::test]
    async fn creates_zone_once() {
        let remote = Arc::new(MemoryRecordStore::default());
        let zones = manager(remote.clone());

        assert!(zones.create_custom_zone_if_needed().await.unwrap());
        assert!(zones.is_zone_created().unwrap());
        assert_eq!(remote.calls(StoreMethod::SaveZone), 1);

        // Second pass only verifies
        assert!(zones.create_custom_zone_if_needed().await.unwrap());
        assert_eq!(remote.calls(StoreMethod::SaveZone), 1);
        assert_eq!(remote.calls(StoreMethod::FetchZone), 1);
    }

    #[tokio::test]
    async fn recreates_deleted_zone() {
        let remote = Arc::new(MemoryRecordStore::default());
        let zones = manager(remote.clone());
        zones.create_custom_zone_if_needed().await.unwrap();

        remote.delete_zone(&ZoneId::new("Notes", None));
        assert!(zones.create_custom_zone_if_needed().await.unwrap());
        assert!(remote.zone_exists(&ZoneId::new("Notes", None)));
        assert_eq!(remote.calls(StoreMethod::SaveZone), 2);
    }

    #[tokio::test]
    async fn transient_creation_failure_is_retried() {
        let remote = Arc::new(MemoryRecordStore::default());
        remote.fail_next(
            StoreMethod::SaveZone,
            RemoteError::new(RemoteErrorKind::ServiceUnavailable, "down"),
        );
        let zones = manager(remote.clone());

        assert!(zones.create_custom_zone_if_needed().await.unwrap());
        assert_eq!(remote.calls(StoreMethod::SaveZone), 2);
    }

    #[tokio::test]
    async fn exhausted_creation_is_reported() {
        let remote = Arc::new(MemoryRecordStore::default());
        for nth in 1..=3 {
            remote.fail_call(
                StoreMethod::SaveZone,
                nth,
                RemoteError::new(RemoteErrorKind::NetworkUnavailable, "offline"),
            );
        }
        let zones = manager(remote.clone());

        let err = zones.create_custom_zone_if_needed().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::RetriesExhausted {
                operation: RetryOperation::ZoneCreation,
                ..
            }
        ));
        assert!(!zones.is_zone_created().unwrap());
    }

    #[tokio::test]
    async fn permission_failure_keeps_flag() {
        let remote = Arc::new(MemoryRecordStore::default());
        let zones = manager(remote.clone());
        zones.create_custom_zone_if_needed().await.unwrap();

        remote.fail_next(
            StoreMethod::FetchZone,
            RemoteError::new(RemoteErrorKind::PermissionFailure, "denied"),
        );
        assert!(zones.create_custom_zone_if_needed().await.is_err());
        assert!(zones.is_zone_created().unwrap());
    }
}
