//! Remote record store contract.

use crate::account::AccountStatus;
use crate::error::{RemoteError, RemoteResult};
use crate::record::{Record, RecordId, ZoneId};
use crate::subscription::{RemoteNotification, Subscription};
use crate::token::ChangeToken;
use async_trait::async_trait;
use serde_json::Value;

/// How a save treats a server copy that changed since it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SavePolicy {
    /// Reject with `ServerRecordChanged` if the server copy changed.
    #[default]
    IfServerRecordUnchanged,
    /// Overwrite only the fields present on the client record.
    ChangedKeys,
    /// Overwrite the whole server record.
    AllKeys,
}

/// Per-record outcome of a batched save/delete.
#[derive(Debug, Clone, Default)]
pub struct ModifyRecordsResult {
    /// Outcome of every saved record, in request order.
    pub save_results: Vec<(RecordId, Result<Record, RemoteError>)>,
    /// Outcome of every deleted record, in request order.
    pub delete_results: Vec<(RecordId, Result<(), RemoteError>)>,
}

/// A record removed from a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    /// Identity of the deleted record.
    pub record_id: RecordId,
    /// Its record type.
    pub record_type: String,
}

/// One page of zone changes.
#[derive(Debug, Clone)]
pub struct ZoneChanges {
    /// Records created or modified since the presented token.
    pub modifications: Vec<Record>,
    /// Records deleted since the presented token.
    pub deletions: Vec<DeletedRecord>,
    /// Token to present for the next page.
    pub change_token: ChangeToken,
    /// True if another page is available.
    pub more_coming: bool,
}

/// A remote record store.
///
/// This trait abstracts the provider, allowing for different implementations
/// (hosted record databases, the in-memory reference store for tests, etc.).
/// Every method is a suspension point; implementations must not block.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Returns the status of the signed-in account.
    async fn account_status(&self) -> RemoteResult<AccountStatus>;

    /// Creates a zone. Creating an existing zone succeeds.
    async fn save_zone(&self, zone_id: &ZoneId) -> RemoteResult<ZoneId>;

    /// Fetches a zone, failing with `ZoneNotFound` if it does not exist.
    async fn fetch_zone(&self, zone_id: &ZoneId) -> RemoteResult<ZoneId>;

    /// Saves subscriptions, reporting each outcome separately.
    async fn save_subscriptions(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> RemoteResult<Vec<(String, Result<Subscription, RemoteError>)>>;

    /// Fetches one subscription, failing with `UnknownItem` if it does not exist.
    async fn fetch_subscription(&self, subscription_id: &str) -> RemoteResult<Subscription>;

    /// Lists every subscription of the account.
    async fn fetch_all_subscriptions(&self) -> RemoteResult<Vec<Subscription>>;

    /// Saves and deletes records in one batch.
    ///
    /// A whole-batch failure (network, `LimitExceeded`) is returned as `Err`;
    /// otherwise every record gets its own result. Deleting an absent record
    /// reports `UnknownItem`, which callers treat as success.
    async fn modify_records(
        &self,
        saving: Vec<Record>,
        deleting: Vec<RecordId>,
        policy: SavePolicy,
    ) -> RemoteResult<ModifyRecordsResult>;

    /// Returns the next page of changes in `zone_id` after `since`.
    ///
    /// `None` requests every change from the beginning.
    async fn record_zone_changes(
        &self,
        zone_id: &ZoneId,
        since: Option<&ChangeToken>,
    ) -> RemoteResult<ZoneChanges>;

    /// Parses a push payload delivered by this provider.
    fn parse_notification(&self, payload: &Value) -> Option<RemoteNotification> {
        RemoteNotification::from_payload(payload)
    }
}
