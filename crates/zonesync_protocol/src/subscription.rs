//! Push subscriptions and notification payloads.

use crate::record::ZoneId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Key under which notification payloads carry their sync envelope.
const ENVELOPE_KEY: &str = "zonesync";

/// Delivery options of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationInfo {
    /// Deliver as a silent, content-available push.
    pub should_send_content_available: bool,
    /// User-visible alert text. `None` for silent pushes.
    pub alert_body: Option<String>,
}

impl NotificationInfo {
    /// Silent delivery: content-available, no alert.
    pub fn silent() -> Self {
        Self {
            should_send_content_available: true,
            alert_body: None,
        }
    }
}

/// A zone subscription for one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription id, unique per store.
    pub subscription_id: String,
    /// Zone being observed.
    pub zone_id: ZoneId,
    /// Record type being observed.
    pub record_type: String,
    /// Delivery options.
    pub notification_info: NotificationInfo,
}

impl Subscription {
    /// Creates a silent zone subscription.
    pub fn new(
        subscription_id: impl Into<String>,
        zone_id: ZoneId,
        record_type: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            zone_id,
            record_type: record_type.into(),
            notification_info: NotificationInfo::silent(),
        }
    }

    /// Builds the push payload a store delivers for this subscription.
    pub fn notification_payload(&self) -> Value {
        json!({
            "aps": { "content-available": 1 },
            ENVELOPE_KEY: {
                "sid": self.subscription_id,
                "zone": self.zone_id.zone_name,
                "owner": self.zone_id.owner_name,
            }
        })
    }
}

/// A parsed push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNotification {
    /// Subscription that fired, if present.
    pub subscription_id: Option<String>,
    /// Zone that changed, if present.
    pub zone_id: Option<ZoneId>,
}

impl RemoteNotification {
    /// Parses a push payload. Returns `None` when the payload carries no
    /// sync envelope.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let envelope = payload.get(ENVELOPE_KEY)?.as_object()?;
        let subscription_id = envelope
            .get("sid")
            .and_then(Value::as_str)
            .map(str::to_string);
        let zone_id = envelope.get("zone").and_then(Value::as_str).map(|zone| {
            ZoneId::new(
                zone,
                envelope
                    .get("owner")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            )
        });
        Some(Self {
            subscription_id,
            zone_id,
        })
    }
}
