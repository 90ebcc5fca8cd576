//! In-memory remote record store.

use crate::changelog::{decode_token, encode_token, ChangeKind, RecordMeta, ZoneLog};
use crate::config::ServerConfig;
use crate::error::{StoreError, StoreResult};
use crate::faults::{FaultPlan, StoreMethod};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use zonesync_protocol::{
    AccountStatus, DeletedRecord, ModifyRecordsResult, Record, RecordId, RemoteError,
    RemoteResult, RemoteStore, SavePolicy, Subscription, ZoneChanges, ZoneId,
};

struct ZoneState {
    records: BTreeMap<String, Record>,
    log: ZoneLog,
}

impl ZoneState {
    fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            log: ZoneLog::new(),
        }
    }

    fn save(&mut self, record: Record, policy: SavePolicy) -> Result<(Record, bool), RemoteError> {
        let name = record.record_name().to_string();
        let (change_tag, created, base) = match self.records.get(&name) {
            Some(existing) => {
                let server_tag = RecordMeta::decode(system_fields_of(existing)?)?.change_tag;
                if policy == SavePolicy::IfServerRecordUnchanged {
                    let client_tag = record
                        .system_fields()
                        .map(RecordMeta::decode)
                        .transpose()?
                        .map(|m| m.change_tag);
                    if client_tag != Some(server_tag) {
                        return Err(RemoteError::server_record_changed(record, existing.clone()));
                    }
                }
                let base = (policy == SavePolicy::ChangedKeys).then(|| existing.clone());
                (server_tag + 1, false, base)
            }
            None => (1, true, None),
        };

        let meta = RecordMeta {
            record_name: name.clone(),
            change_tag,
        };
        let mut stored = Record::with_system_fields(
            record.record_type.clone(),
            record.id.clone(),
            Some(meta.encode()?),
        );
        if let Some(base) = base {
            stored.merge_fields_from(&base);
        }
        stored.merge_fields_from(&record);

        self.log.append(&name, &stored.record_type, ChangeKind::Saved);
        self.records.insert(name, stored.clone());
        Ok((stored, created))
    }

    fn delete(&mut self, record_id: &RecordId) -> StoreResult<String> {
        let removed = self
            .records
            .remove(&record_id.record_name)
            .ok_or_else(|| StoreError::UnknownItem(record_id.to_string()))?;
        self.log
            .append(&record_id.record_name, &removed.record_type, ChangeKind::Deleted);
        Ok(removed.record_type)
    }
}

fn system_fields_of(record: &Record) -> StoreResult<&zonesync_protocol::SystemFields> {
    record
        .system_fields()
        .ok_or_else(|| StoreError::malformed("system fields", "stored record has none"))
}

struct Inner {
    account_status: AccountStatus,
    zones: BTreeMap<ZoneId, ZoneState>,
    subscriptions: BTreeMap<String, Subscription>,
    notifications: Vec<Value>,
    epoch: u64,
    creates: HashMap<RecordId, usize>,
    delete_requests: Vec<RecordId>,
    deleted: Vec<RecordId>,
}

impl Inner {
    fn zone_mut(&mut self, zone_id: &ZoneId) -> StoreResult<&mut ZoneState> {
        self.zones
            .get_mut(zone_id)
            .ok_or_else(|| StoreError::ZoneNotFound(zone_id.clone()))
    }

    fn notify(&mut self, zone_id: &ZoneId, record_type: &str) {
        let payloads: Vec<Value> = self
            .subscriptions
            .values()
            .filter(|s| &s.zone_id == zone_id && s.record_type == record_type)
            .map(Subscription::notification_payload)
            .collect();
        self.notifications.extend(payloads);
    }
}

/// Decrements the in-flight counter when a call finishes.
struct CallGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A remote record store kept entirely in memory.
///
/// It implements the full [`RemoteStore`] contract: zones, silent
/// subscriptions, optimistic concurrency through change tags carried in the
/// system fields, a paged change log per zone, and change-token expiry.
/// Test helpers inject faults, simulate writes by other devices and expose
/// call history.
///
/// Writes made through the [`RemoteStore`] methods do not produce push
/// notifications; the writing client already knows about them. Writes made
/// through [`MemoryRecordStore::external_save`] and
/// [`MemoryRecordStore::external_delete`] do.
pub struct MemoryRecordStore {
    config: ServerConfig,
    inner: Mutex<Inner>,
    faults: Mutex<FaultPlan>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryRecordStore {
    /// Creates an empty store with a signed-in account.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                account_status: AccountStatus::Available,
                zones: BTreeMap::new(),
                subscriptions: BTreeMap::new(),
                notifications: Vec::new(),
                epoch: 1,
                creates: HashMap::new(),
                delete_requests: Vec::new(),
                deleted: Vec::new(),
            }),
            faults: Mutex::new(FaultPlan::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    async fn enter(&self, method: StoreMethod) -> RemoteResult<CallGuard<'_>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = CallGuard {
            in_flight: &self.in_flight,
        };

        if let Some(latency) = self.config.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.faults.lock().record_call(method) {
            tracing::debug!(?method, error = %error, "injected fault");
            return Err(error);
        }
        Ok(guard)
    }

    // --- test helpers ---

    /// Sets the status reported by `account_status`.
    pub fn set_account_status(&self, status: AccountStatus) {
        self.inner.lock().account_status = status;
    }

    /// Fails the next call of `method` with `error`.
    pub fn fail_next(&self, method: StoreMethod, error: RemoteError) {
        self.faults.lock().schedule(method, 1, error);
    }

    /// Fails the `nth` call of `method` counted from now (1 = next call).
    pub fn fail_call(&self, method: StoreMethod, nth: usize, error: RemoteError) {
        self.faults.lock().schedule(method, nth, error);
    }

    /// Fails the next save or delete of `record_name` with `error`.
    pub fn fail_record(&self, record_name: &str, error: RemoteError) {
        self.faults.lock().fail_record(record_name, error);
    }

    /// Number of calls made to `method`, faulted ones included.
    pub fn calls(&self, method: StoreMethod) -> usize {
        self.faults.lock().calls(method)
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Saves a record as another device would, ignoring change tags, and
    /// notifies matching subscriptions.
    pub fn external_save(&self, record: Record) -> RemoteResult<Record> {
        let mut inner = self.inner.lock();
        let zone_id = record.id.zone_id.clone();
        let record_type = record.record_type.clone();
        let (saved, created) = inner.zone_mut(&zone_id)?.save(record, SavePolicy::AllKeys)?;
        if created {
            *inner.creates.entry(saved.id.clone()).or_insert(0) += 1;
        }
        inner.notify(&zone_id, &record_type);
        Ok(saved)
    }

    /// Deletes a record as another device would and notifies matching
    /// subscriptions.
    pub fn external_delete(&self, record_id: &RecordId) -> RemoteResult<()> {
        let mut inner = self.inner.lock();
        let record_type = inner.zone_mut(&record_id.zone_id)?.delete(record_id)?;
        inner.notify(&record_id.zone_id, &record_type);
        Ok(())
    }

    /// Deletes a zone with its records and subscriptions. Every change token
    /// issued so far expires.
    pub fn delete_zone(&self, zone_id: &ZoneId) {
        let mut inner = self.inner.lock();
        inner.zones.remove(zone_id);
        inner.subscriptions.retain(|_, s| &s.zone_id != zone_id);
        inner.epoch += 1;
    }

    /// Deletes one subscription.
    pub fn delete_subscription(&self, subscription_id: &str) {
        self.inner.lock().subscriptions.remove(subscription_id);
    }

    /// Invalidates every change token issued so far.
    pub fn expire_tokens(&self) {
        self.inner.lock().epoch += 1;
    }

    /// Returns true if the zone exists.
    pub fn zone_exists(&self, zone_id: &ZoneId) -> bool {
        self.inner.lock().zones.contains_key(zone_id)
    }

    /// Returns the stored copy of a record.
    pub fn record(&self, record_id: &RecordId) -> Option<Record> {
        self.inner
            .lock()
            .zones
            .get(&record_id.zone_id)
            .and_then(|z| z.records.get(&record_id.record_name))
            .cloned()
    }

    /// Returns every record of a zone, ordered by name.
    pub fn records(&self, zone_id: &ZoneId) -> Vec<Record> {
        self.inner
            .lock()
            .zones
            .get(zone_id)
            .map(|z| z.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every subscription, ordered by id.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.lock().subscriptions.values().cloned().collect()
    }

    /// Number of times a record was created (saved while absent).
    pub fn create_count(&self, record_id: &RecordId) -> usize {
        self.inner
            .lock()
            .creates
            .get(record_id)
            .copied()
            .unwrap_or(0)
    }

    /// Every id submitted for deletion through `modify_records`, in order.
    pub fn delete_requests(&self) -> Vec<RecordId> {
        self.inner.lock().delete_requests.clone()
    }

    /// Every id whose deletion through `modify_records` removed a record.
    pub fn deleted_records(&self) -> Vec<RecordId> {
        self.inner.lock().deleted.clone()
    }

    /// Drains the queued push notification payloads.
    pub fn take_notifications(&self) -> Vec<Value> {
        std::mem::take(&mut self.inner.lock().notifications)
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

#[async_trait]
impl RemoteStore for MemoryRecordStore {
    async fn account_status(&self) -> RemoteResult<AccountStatus> {
        let _call = self.enter(StoreMethod::AccountStatus).await?;
        Ok(self.inner.lock().account_status)
    }

    async fn save_zone(&self, zone_id: &ZoneId) -> RemoteResult<ZoneId> {
        let _call = self.enter(StoreMethod::SaveZone).await?;
        let mut inner = self.inner.lock();
        if !inner.zones.contains_key(zone_id) {
            tracing::debug!(zone = %zone_id, "zone created");
            inner.zones.insert(zone_id.clone(), ZoneState::new());
        }
        Ok(zone_id.clone())
    }

    async fn fetch_zone(&self, zone_id: &ZoneId) -> RemoteResult<ZoneId> {
        let _call = self.enter(StoreMethod::FetchZone).await?;
        let inner = self.inner.lock();
        if inner.zones.contains_key(zone_id) {
            Ok(zone_id.clone())
        } else {
            Err(StoreError::ZoneNotFound(zone_id.clone()).into())
        }
    }

    async fn save_subscriptions(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> RemoteResult<Vec<(String, Result<Subscription, RemoteError>)>> {
        let _call = self.enter(StoreMethod::SaveSubscriptions).await?;
        let mut inner = self.inner.lock();
        let mut results = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let id = subscription.subscription_id.clone();
            if inner.zones.contains_key(&subscription.zone_id) {
                inner.subscriptions.insert(id.clone(), subscription.clone());
                results.push((id, Ok(subscription)));
            } else {
                let error = StoreError::ZoneNotFound(subscription.zone_id.clone()).into();
                results.push((id, Err(error)));
            }
        }
        Ok(results)
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> RemoteResult<Subscription> {
        let _call = self.enter(StoreMethod::FetchSubscription).await?;
        self.inner
            .lock()
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownItem(subscription_id.to_string()).into())
    }

    async fn fetch_all_subscriptions(&self) -> RemoteResult<Vec<Subscription>> {
        let _call = self.enter(StoreMethod::FetchAllSubscriptions).await?;
        Ok(self.subscriptions())
    }

    async fn modify_records(
        &self,
        saving: Vec<Record>,
        deleting: Vec<RecordId>,
        policy: SavePolicy,
    ) -> RemoteResult<ModifyRecordsResult> {
        let _call = self.enter(StoreMethod::ModifyRecords).await?;

        let count = saving.len() + deleting.len();
        if count > self.config.batch_limit {
            return Err(StoreError::LimitExceeded {
                count,
                limit: self.config.batch_limit,
            }
            .into());
        }

        let mut result = ModifyRecordsResult::default();
        for record in saving {
            let id = record.id.clone();
            let fault = self.faults.lock().take_record_fault(id.record_name.as_str());
            let outcome = match fault {
                Some(error) => Err(error),
                None => {
                    let mut inner = self.inner.lock();
                    let saved = inner
                        .zone_mut(&id.zone_id)
                        .map_err(RemoteError::from)
                        .and_then(|zone| zone.save(record, policy));
                    saved.map(|(saved, created)| {
                        if created {
                            *inner.creates.entry(id.clone()).or_insert(0) += 1;
                        }
                        saved
                    })
                }
            };
            result.save_results.push((id, outcome));
        }

        for id in deleting {
            let fault = self.faults.lock().take_record_fault(id.record_name.as_str());
            let outcome = match fault {
                Some(error) => Err(error),
                None => {
                    let mut inner = self.inner.lock();
                    inner.delete_requests.push(id.clone());
                    let deleted = inner.zone_mut(&id.zone_id).and_then(|zone| zone.delete(&id));
                    match deleted {
                        Ok(_) => {
                            inner.deleted.push(id.clone());
                            Ok(())
                        }
                        Err(e) => Err(e.into()),
                    }
                }
            };
            result.delete_results.push((id, outcome));
        }

        Ok(result)
    }

    async fn record_zone_changes(
        &self,
        zone_id: &ZoneId,
        since: Option<&zonesync_protocol::ChangeToken>,
    ) -> RemoteResult<ZoneChanges> {
        let _call = self.enter(StoreMethod::RecordZoneChanges).await?;
        let mut inner = self.inner.lock();
        let epoch = inner.epoch;
        let page_size = self.config.page_size;
        let zone = inner.zone_mut(zone_id)?;

        let since_seq = match since {
            Some(token) => decode_token(token, epoch)?,
            None => 0,
        };
        if since_seq > zone.log.cursor() {
            return Err(StoreError::TokenExpired.into());
        }

        let (entries, cursor, more_coming) = zone.log.page_since(since_seq, page_size);
        let mut modifications = Vec::new();
        let mut deletions = Vec::new();
        for entry in entries {
            let record_id = RecordId::new(entry.record_name.clone(), zone_id.clone());
            match entry.kind {
                ChangeKind::Saved => {
                    if let Some(record) = zone.records.get(&entry.record_name) {
                        modifications.push(record.clone());
                    }
                }
                ChangeKind::Deleted => deletions.push(DeletedRecord {
                    record_id,
                    record_type: entry.record_type,
                }),
            }
        }

        Ok(ZoneChanges {
            modifications,
            deletions,
            change_token: encode_token(epoch, cursor)?,
            more_coming,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonesync_protocol::RemoteErrorKind;

    fn zone() -> ZoneId {
        ZoneId::new("Notes", None)
    }

    fn note(name: &str, title: &str) -> Record {
        let mut record = Record::new("Note", RecordId::new(name, zone()));
        record.set("title", title);
        record
    }

    async fn store_with_zone() -> MemoryRecordStore {
        let store = MemoryRecordStore::default();
        store.save_zone(&zone()).await.unwrap();
        store
    }

    async fn save_one(store: &MemoryRecordStore, record: Record) -> Result<Record, RemoteError> {
        let mut result = store
            .modify_records(vec![record], vec![], SavePolicy::IfServerRecordUnchanged)
            .await
            .unwrap();
        result.save_results.remove(0).1
    }

    #[tokio::test]
    async fn zone_lifecycle() {
        let store = MemoryRecordStore::default();
        let err = store.fetch_zone(&zone()).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::ZoneNotFound);

        store.save_zone(&zone()).await.unwrap();
        store.save_zone(&zone()).await.unwrap();
        assert_eq!(store.fetch_zone(&zone()).await.unwrap(), zone());

        store.delete_zone(&zone());
        assert!(!store.zone_exists(&zone()));
    }

    #[tokio::test]
    async fn save_assigns_system_fields() {
        let store = store_with_zone().await;
        let saved = save_one(&store, note("n1", "hello")).await.unwrap();

        assert!(saved.system_fields().is_some());
        assert_eq!(saved.get_string("title"), Some("hello"));
        assert_eq!(store.create_count(&saved.id), 1);
    }

    #[tokio::test]
    async fn stale_save_conflicts() {
        let store = store_with_zone().await;
        let first = save_one(&store, note("n1", "v1")).await.unwrap();

        // Another device updates the record
        let mut other = first.clone();
        other.set("title", "other");
        store.external_save(other).unwrap();

        let mut stale = first.clone();
        stale.set("title", "mine");
        let err = save_one(&store, stale).await.unwrap_err();
        let conflict = err.conflict_data().unwrap();
        assert_eq!(conflict.client_record.get_string("title"), Some("mine"));
        assert_eq!(conflict.server_record.get_string("title"), Some("other"));

        // Resubmitting on top of the server copy succeeds
        let mut merged = conflict.server_record.clone();
        merged.set("title", "merged");
        let saved = save_one(&store, merged).await.unwrap();
        assert_eq!(saved.get_string("title"), Some("merged"));
    }

    #[tokio::test]
    async fn create_without_metadata_conflicts_with_existing() {
        let store = store_with_zone().await;
        save_one(&store, note("n1", "v1")).await.unwrap();

        let err = save_one(&store, note("n1", "again")).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::ServerRecordChanged);
        assert_eq!(store.create_count(&RecordId::new("n1", zone())), 1);
    }

    #[tokio::test]
    async fn changed_keys_merges_fields() {
        let store = store_with_zone().await;
        let mut first = note("n1", "v1");
        first.set("pinned", true);
        save_one(&store, first).await.unwrap();

        let mut partial = Record::new("Note", RecordId::new("n1", zone()));
        partial.set("title", "v2");
        store
            .modify_records(vec![partial], vec![], SavePolicy::ChangedKeys)
            .await
            .unwrap();

        let stored = store.record(&RecordId::new("n1", zone())).unwrap();
        assert_eq!(stored.get_string("title"), Some("v2"));
        assert!(stored.get("pinned").is_some());
    }

    #[tokio::test]
    async fn delete_absent_reports_unknown_item() {
        let store = store_with_zone().await;
        save_one(&store, note("n1", "v1")).await.unwrap();

        let result = store
            .modify_records(
                vec![],
                vec![RecordId::new("n1", zone()), RecordId::new("missing", zone())],
                SavePolicy::default(),
            )
            .await
            .unwrap();

        assert!(result.delete_results[0].1.is_ok());
        let err = result.delete_results[1].1.as_ref().unwrap_err();
        assert!(err.is_unknown_item());
        assert_eq!(store.deleted_records(), vec![RecordId::new("n1", zone())]);
        assert_eq!(store.delete_requests().len(), 2);
    }

    #[tokio::test]
    async fn batch_limit_is_enforced() {
        let store = MemoryRecordStore::new(ServerConfig::new().with_batch_limit(2));
        store.save_zone(&zone()).await.unwrap();

        let records = (0..3).map(|i| note(&format!("n{i}"), "x")).collect();
        let err = store
            .modify_records(records, vec![], SavePolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::LimitExceeded);
    }

    #[tokio::test]
    async fn changes_are_paged() {
        let store = MemoryRecordStore::new(ServerConfig::new().with_page_size(2));
        store.save_zone(&zone()).await.unwrap();
        for i in 0..3 {
            save_one(&store, note(&format!("n{i}"), "x")).await.unwrap();
        }

        let page1 = store.record_zone_changes(&zone(), None).await.unwrap();
        assert_eq!(page1.modifications.len(), 2);
        assert!(page1.more_coming);

        let page2 = store
            .record_zone_changes(&zone(), Some(&page1.change_token))
            .await
            .unwrap();
        assert_eq!(page2.modifications.len(), 1);
        assert!(!page2.more_coming);

        let empty = store
            .record_zone_changes(&zone(), Some(&page2.change_token))
            .await
            .unwrap();
        assert!(empty.modifications.is_empty());
        assert!(!empty.more_coming);
    }

    #[tokio::test]
    async fn deletions_are_reported() {
        let store = store_with_zone().await;
        save_one(&store, note("n1", "x")).await.unwrap();
        let page = store.record_zone_changes(&zone(), None).await.unwrap();

        store.external_delete(&RecordId::new("n1", zone())).unwrap();
        let next = store
            .record_zone_changes(&zone(), Some(&page.change_token))
            .await
            .unwrap();
        assert!(next.modifications.is_empty());
        assert_eq!(next.deletions.len(), 1);
        assert_eq!(next.deletions[0].record_type, "Note");
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let store = store_with_zone().await;
        let page = store.record_zone_changes(&zone(), None).await.unwrap();

        store.expire_tokens();
        let err = store
            .record_zone_changes(&zone(), Some(&page.change_token))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::ChangeTokenExpired);

        assert!(store.record_zone_changes(&zone(), None).await.is_ok());
    }

    #[tokio::test]
    async fn subscriptions_round_trip() {
        let store = store_with_zone().await;
        let sub = Subscription::new("Notes.Note.subscription", zone(), "Note");
        let results = store.save_subscriptions(vec![sub.clone()]).await.unwrap();
        assert!(results[0].1.is_ok());

        assert_eq!(
            store.fetch_subscription("Notes.Note.subscription").await.unwrap(),
            sub
        );
        store.delete_subscription("Notes.Note.subscription");
        let err = store
            .fetch_subscription("Notes.Note.subscription")
            .await
            .unwrap_err();
        assert!(err.is_unknown_item());
    }

    #[tokio::test]
    async fn external_writes_notify_subscribers() {
        let store = store_with_zone().await;
        let sub = Subscription::new("Notes.Note.subscription", zone(), "Note");
        store.save_subscriptions(vec![sub]).await.unwrap();

        save_one(&store, note("n1", "mine")).await.unwrap();
        assert!(store.take_notifications().is_empty());

        store.external_save(note("n2", "theirs")).unwrap();
        let notifications = store.take_notifications();
        assert_eq!(notifications.len(), 1);
        let parsed = store.parse_notification(&notifications[0]).unwrap();
        assert_eq!(parsed.subscription_id.as_deref(), Some("Notes.Note.subscription"));
    }

    #[tokio::test]
    async fn injected_faults_fire() {
        let store = store_with_zone().await;
        store.fail_next(
            StoreMethod::FetchZone,
            RemoteError::new(RemoteErrorKind::NetworkFailure, "injected"),
        );
        assert!(store.fetch_zone(&zone()).await.is_err());
        assert!(store.fetch_zone(&zone()).await.is_ok());
        assert_eq!(store.calls(StoreMethod::FetchZone), 2);

        store.fail_record(
            "n1",
            RemoteError::new(RemoteErrorKind::QuotaExceeded, "full"),
        );
        let err = save_one(&store, note("n1", "x")).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::QuotaExceeded);
        assert!(save_one(&store, note("n1", "x")).await.is_ok());
    }

    #[tokio::test]
    async fn account_status_is_settable() {
        let store = MemoryRecordStore::default();
        assert_eq!(store.account_status().await.unwrap(), AccountStatus::Available);
        store.set_account_status(AccountStatus::NoAccount);
        assert_eq!(store.account_status().await.unwrap(), AccountStatus::NoAccount);
    }
}
