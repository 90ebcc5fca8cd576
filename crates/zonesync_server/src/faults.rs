//! Fault injection for the reference store.

use std::collections::{HashMap, VecDeque};
use zonesync_protocol::RemoteError;

/// A call on the [`RemoteStore`](zonesync_protocol::RemoteStore) surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreMethod {
    /// `account_status`
    AccountStatus,
    /// `save_zone`
    SaveZone,
    /// `fetch_zone`
    FetchZone,
    /// `save_subscriptions`
    SaveSubscriptions,
    /// `fetch_subscription`
    FetchSubscription,
    /// `fetch_all_subscriptions`
    FetchAllSubscriptions,
    /// `modify_records`
    ModifyRecords,
    /// `record_zone_changes`
    RecordZoneChanges,
}

struct ScheduledFault {
    method: StoreMethod,
    at_call: usize,
    error: RemoteError,
}

/// Call counters plus the faults scheduled against them.
#[derive(Default)]
pub(crate) struct FaultPlan {
    calls: HashMap<StoreMethod, usize>,
    scheduled: Vec<ScheduledFault>,
    record_faults: HashMap<String, VecDeque<RemoteError>>,
}

impl FaultPlan {
    /// Counts a call and returns the fault scheduled for it, if any.
    pub fn record_call(&mut self, method: StoreMethod) -> Option<RemoteError> {
        let count = self.calls.entry(method).or_insert(0);
        *count += 1;
        let current = *count;

        let index = self
            .scheduled
            .iter()
            .position(|f| f.method == method && f.at_call == current)?;
        Some(self.scheduled.remove(index).error)
    }

    /// Fails the `nth` call of `method` counted from now (1 = next call).
    pub fn schedule(&mut self, method: StoreMethod, nth: usize, error: RemoteError) {
        let at_call = self.calls(method) + nth.max(1);
        self.scheduled.push(ScheduledFault {
            method,
            at_call,
            error,
        });
    }

    pub fn calls(&self, method: StoreMethod) -> usize {
        self.calls.get(&method).copied().unwrap_or(0)
    }

    /// Fails the next save or delete of `record_name`.
    pub fn fail_record(&mut self, record_name: &str, error: RemoteError) {
        self.record_faults
            .entry(record_name.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn take_record_fault(&mut self, record_name: &str) -> Option<RemoteError> {
        let queue = self.record_faults.get_mut(record_name)?;
        let error = queue.pop_front();
        if queue.is_empty() {
            self.record_faults.remove(record_name);
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonesync_protocol::RemoteErrorKind;

    fn err() -> RemoteError {
        RemoteError::new(RemoteErrorKind::NetworkFailure, "injected")
    }

    #[test]
    fn scheduled_fault_fires_once() {
        let mut plan = FaultPlan::default();
        plan.schedule(StoreMethod::FetchZone, 2, err());

        assert!(plan.record_call(StoreMethod::FetchZone).is_none());
        assert!(plan.record_call(StoreMethod::FetchZone).is_some());
        assert!(plan.record_call(StoreMethod::FetchZone).is_none());
        assert_eq!(plan.calls(StoreMethod::FetchZone), 3);
    }

    #[test]
    fn faults_are_per_method() {
        let mut plan = FaultPlan::default();
        plan.schedule(StoreMethod::SaveZone, 1, err());

        assert!(plan.record_call(StoreMethod::FetchZone).is_none());
        assert!(plan.record_call(StoreMethod::SaveZone).is_some());
    }

    #[test]
    fn record_faults_queue() {
        let mut plan = FaultPlan::default();
        plan.fail_record("n1", err());
        plan.fail_record("n1", err());

        assert!(plan.take_record_fault("n1").is_some());
        assert!(plan.take_record_fault("n1").is_some());
        assert!(plan.take_record_fault("n1").is_none());
        assert!(plan.take_record_fault("n2").is_none());
    }
}
