//! Push notification handling.

use super::SyncEngine;
use crate::local::LocalStore;
use serde_json::Value;
use std::sync::Arc;
use zonesync_protocol::RemoteStore;

impl<R: RemoteStore, L: LocalStore> SyncEngine<R, L> {
    /// Handles a push payload.
    ///
    /// Returns true if the payload came from one of this engine's
    /// subscriptions, in which case a fetch is queued in the background.
    pub fn process_subscription_notification(self: &Arc<Self>, payload: &Value) -> bool {
        let Some(notification) = self.remote.parse_notification(payload) else {
            tracing::debug!("not a sync notification");
            return false;
        };
        if notification
            .zone_id
            .as_ref()
            .is_some_and(|zone| zone != &self.zone_id)
        {
            tracing::debug!("notification for another zone");
            return false;
        }
        if !self
            .subscriptions
            .should_handle_subscription_id(notification.subscription_id.as_deref())
        {
            tracing::debug!(
                subscription_id = ?notification.subscription_id,
                "notification for unknown subscription"
            );
            return false;
        }

        tracing::info!(
            subscription_id = ?notification.subscription_id,
            "remote change notification, fetching"
        );
        let fetch = self.fetch_remote_changes();
        tokio::spawn(async move {
            if let Err(e) = fetch.await {
                tracing::warn!(error = %e, "notification fetch failed");
            }
        });
        true
    }
}
