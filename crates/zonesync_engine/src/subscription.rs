//! Zone subscription provisioning.

use crate::error::{RetryOperation, SyncError, SyncResult};
use crate::retry::Retrier;
use crate::settings::{subscription_registry_key, SettingsStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use zonesync_protocol::{RemoteStore, Subscription, ZoneId};

/// Registry of record type to subscription id.
pub type SubscriptionRegistry = BTreeMap<String, String>;

/// Reads the subscription registry of `zone_name` from `settings`.
pub fn load_registry(
    settings: &dyn SettingsStore,
    zone_name: &str,
) -> SyncResult<SubscriptionRegistry> {
    match settings.get(&subscription_registry_key(zone_name))? {
        Some(bytes) => Ok(ciborium::from_reader(bytes.as_slice())?),
        None => Ok(SubscriptionRegistry::new()),
    }
}

/// Creates one silent zone subscription per record type and keeps a
/// persisted registry of them.
pub struct SubscriptionManager<R: RemoteStore> {
    remote: Arc<R>,
    settings: Arc<dyn SettingsStore>,
    zone_id: ZoneId,
    key: String,
    retrier: Retrier,
}

impl<R: RemoteStore> SubscriptionManager<R> {
    /// Creates a subscription manager.
    pub fn new(
        remote: Arc<R>,
        settings: Arc<dyn SettingsStore>,
        zone_id: ZoneId,
        retrier: Retrier,
    ) -> Self {
        let key = subscription_registry_key(&zone_id.zone_name);
        Self {
            remote,
            settings,
            zone_id,
            key,
            retrier,
        }
    }

    /// The subscription id used for `record_type`.
    pub fn subscription_id(&self, record_type: &str) -> String {
        format!("{}.{}.subscription", self.zone_id.zone_name, record_type)
    }

    /// Returns the persisted registry.
    pub fn registry(&self) -> SyncResult<SubscriptionRegistry> {
        load_registry(self.settings.as_ref(), &self.zone_id.zone_name)
    }

    fn save_registry(&self, registry: &SubscriptionRegistry) -> SyncResult<()> {
        let mut bytes = Vec::new();
        ciborium::into_writer(registry, &mut bytes)?;
        self.settings.set(&self.key, bytes)
    }

    /// Forgets every registered subscription.
    pub fn reset(&self) -> SyncResult<()> {
        self.settings.remove(&self.key)
    }

    /// Returns true if `subscription_id` belongs to this engine.
    pub fn should_handle_subscription_id(&self, subscription_id: Option<&str>) -> bool {
        let Some(subscription_id) = subscription_id else {
            return false;
        };
        match self.registry() {
            Ok(registry) => registry.values().any(|id| id == subscription_id),
            Err(e) => {
                tracing::error!(error = %e, "failed to read subscription registry");
                false
            }
        }
    }

    /// Verifies the registered subscriptions and creates the missing ones.
    ///
    /// A registered subscription the server reports missing, or that fails
    /// verification with a non-retryable error, is dropped from the
    /// registry and created again.
    pub async fn create_private_subscriptions_if_needed(
        &self,
        record_types: &[String],
    ) -> SyncResult<bool> {
        tracing::info!(zone = %self.zone_id, "processing subscriptions");

        let mut registry = self.registry()?;
        let mut create = Vec::new();

        for record_type in record_types {
            let Some(subscription_id) = registry.get(record_type).cloned() else {
                tracing::debug!(%record_type, "no subscription, creating one");
                create.push(record_type.clone());
                continue;
            };

            let checked = self
                .retrier
                .run(RetryOperation::SubscriptionCheck, || async {
                    self.remote.fetch_subscription(&subscription_id)
                        .await
                        .map_err(SyncError::from)
                })
                .await;
            match checked {
                Ok(_) => {
                    tracing::debug!(%subscription_id, "subscription verified");
                }
                Err(SyncError::Remote(e)) => {
                    tracing::warn!(
                        %subscription_id,
                        error = %e,
                        "subscription missing remotely, recreating"
                    );
                    registry.remove(record_type);
                    create.push(record_type.clone());
                }
                Err(e) => return Err(e),
            }
        }

        self.save_registry(&registry)?;
        if !create.is_empty() {
            self.create_subscriptions(&create).await?;
        }

        tracing::info!(zone = %self.zone_id, "subscriptions ready");
        Ok(true)
    }

    async fn create_subscriptions(&self, record_types: &[String]) -> SyncResult<()> {
        let subscriptions: Vec<Subscription> = record_types
            .iter()
            .map(|record_type| {
                Subscription::new(
                    self.subscription_id(record_type),
                    self.zone_id.clone(),
                    record_type.clone(),
                )
            })
            .collect();

        tracing::info!(count = subscriptions.len(), "creating subscriptions");
        let results = self
            .retrier
            .run(RetryOperation::SubscriptionCreation, || async {
                self.remote.save_subscriptions(subscriptions.clone())
                    .await
                    .map_err(SyncError::from)
            })
            .await?;

        let mut registry = self.registry()?;
        let mut first_error = None;
        for (subscription_id, result) in results {
            match result {
                Ok(subscription) => {
                    tracing::info!(
                        record_type = %subscription.record_type,
                        %subscription_id,
                        "subscription created"
                    );
                    registry.insert(subscription.record_type, subscription.subscription_id);
                }
                Err(e) => {
                    tracing::error!(%subscription_id, error = %e, "subscription not created");
                    first_error.get_or_insert(e);
                }
            }
        }
        self.save_registry(&registry)?;

        match first_error {
            Some(e) => Err(SyncError::Remote(e)),
            None => Ok(()),
        }
    }

    /// Aligns the registry with the server: entries whose subscription no
    /// longer exists are dropped, and server subscriptions that follow this
    /// engine's naming scheme are adopted.
    pub async fn reconcile(&self, record_types: &[String]) -> SyncResult<()> {
        let remote = self
            .retrier
            .run(RetryOperation::SubscriptionCheck, || async {
                self.remote.fetch_all_subscriptions()
                    .await
                    .map_err(SyncError::from)
            })
            .await?;

        let mut registry = self.registry()?;
        registry.retain(|_, id| remote.iter().any(|s| &s.subscription_id == id));

        for subscription in remote.iter().filter(|s| s.zone_id == self.zone_id) {
            let record_type = &subscription.record_type;
            if record_types.contains(record_type)
                && subscription.subscription_id == self.subscription_id(record_type)
            {
                registry
                    .entry(record_type.clone())
                    .or_insert_with(|| subscription.subscription_id.clone());
            }
        }

        tracing::debug!(count = registry.len(), "subscription registry reconciled");
        self.save_registry(&registry)
    }
}
