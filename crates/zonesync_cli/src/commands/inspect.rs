//! Inspect command implementation.

use super::{CommandError, State};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use zonesync_engine::{load_registry, zone_created_key, SettingsStore, TokenManager};

/// Persisted state of one zone.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// State directory path.
    pub path: String,
    /// Zone name.
    pub zone: String,
    /// Size of the stored change token, if any.
    pub change_token_bytes: Option<usize>,
    /// Whether the zone is recorded as created.
    pub zone_created: bool,
    /// Record type to subscription id.
    pub subscriptions: BTreeMap<String, String>,
    /// Queued deletion operations.
    pub pending_operations: usize,
    /// Ids awaiting deletion, deduplicated.
    pub pending_deletions: Vec<String>,
    /// Every settings key, including other zones'.
    pub settings_keys: Vec<String>,
}

/// Runs the inspect command.
pub fn run(path: &Path, zone: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, zone)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects the persisted state of `zone`.
pub fn inspect(path: &Path, zone: &str) -> Result<InspectResult, CommandError> {
    let state = State::open(path)?;
    let pending = state.pending()?;
    let settings = state.settings;

    let zone_created = settings.get_flag(&zone_created_key(zone))?;
    let subscriptions = load_registry(&settings, zone)?;
    let settings_keys = settings.keys()?;
    let token = TokenManager::new(Arc::new(settings), zone).change_token()?;

    Ok(InspectResult {
        path: path.display().to_string(),
        zone: zone.to_string(),
        change_token_bytes: token.map(|t| t.as_bytes().len()),
        zone_created,
        subscriptions,
        pending_operations: pending.operations().len(),
        pending_deletions: pending.pending_deletions(),
        settings_keys,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("zonesync state");
    println!("==============");
    println!();
    println!("Path: {}", result.path);
    println!("Zone: {}", result.zone);
    println!();

    match result.change_token_bytes {
        Some(len) => println!("Change token:  {len} bytes"),
        None => println!("Change token:  none (next fetch is a full resync)"),
    }
    println!(
        "Zone created:  {}",
        if result.zone_created { "yes" } else { "no" }
    );
    println!();

    println!("Subscriptions ({}):", result.subscriptions.len());
    for (record_type, subscription_id) in &result.subscriptions {
        println!("  {record_type:<20} {subscription_id}");
    }
    println!();

    println!(
        "Pending deletions: {} ids in {} operations",
        result.pending_deletions.len(),
        result.pending_operations
    );
    for id in &result.pending_deletions {
        println!("  {id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonesync_engine::{
        subscription_registry_key, FileSettingsStore, PendingOperationsManager, StateDir,
    };
    use zonesync_engine::protocol::ChangeToken;

    #[test]
    fn empty_state_reports_nothing() {
        let temp = tempfile::tempdir().unwrap();
        drop(StateDir::open(temp.path()).unwrap());

        let result = inspect(temp.path(), "Notes").unwrap();
        assert!(result.change_token_bytes.is_none());
        assert!(!result.zone_created);
        assert!(result.subscriptions.is_empty());
        assert!(result.pending_deletions.is_empty());
    }

    #[test]
    fn reports_persisted_state() {
        let temp = tempfile::tempdir().unwrap();
        {
            let dir = StateDir::open(temp.path()).unwrap();
            let settings = Arc::new(FileSettingsStore::open(&dir).unwrap());
            settings.set_flag(&zone_created_key("Notes"), true).unwrap();
            TokenManager::new(settings.clone(), "Notes")
                .set_change_token(Some(&ChangeToken::from_bytes(vec![1, 2, 3])))
                .unwrap();
            // An empty CBOR map
            settings
                .set(&subscription_registry_key("Other"), vec![0xa0])
                .unwrap();
            let pending = PendingOperationsManager::open(&dir.pending_dir()).unwrap();
            pending.add_pending_deletions(vec!["a".into(), "b".into()]).unwrap();
            pending.add_pending_deletions(vec!["b".into()]).unwrap();
        }

        let result = inspect(temp.path(), "Notes").unwrap();
        assert_eq!(result.change_token_bytes, Some(3));
        assert!(result.zone_created);
        assert_eq!(result.pending_operations, 2);
        assert_eq!(result.pending_deletions, vec!["a".to_string(), "b".to_string()]);
        assert!(result.settings_keys.contains(&"CREATEDZONE-Notes".to_string()));

        let other = inspect(temp.path(), "Other").unwrap();
        assert!(other.subscriptions.is_empty());
        assert!(!other.zone_created);
    }
}
