//! Reset command implementation.

use super::{CommandError, State};
use std::path::Path;
use std::sync::Arc;
use zonesync_engine::{
    subscription_registry_key, zone_created_key, SettingsStore, TokenManager,
};

/// What to forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetScope {
    /// The change token.
    pub token: bool,
    /// The zone created flag.
    pub zone_flag: bool,
    /// The subscription registry.
    pub subscriptions: bool,
}

/// Runs the reset command.
pub fn run(path: &Path, zone: &str, scope: ResetScope) -> Result<(), Box<dyn std::error::Error>> {
    reset(path, zone, scope)?;

    if scope.token {
        println!("Cleared change token of {zone}; next fetch is a full resync");
    }
    if scope.zone_flag {
        println!("Cleared zone flag of {zone}; next pass verifies the zone");
    }
    if scope.subscriptions {
        println!("Cleared subscription registry of {zone}");
    }
    Ok(())
}

/// Removes the settings selected by `scope`.
pub fn reset(path: &Path, zone: &str, scope: ResetScope) -> Result<(), CommandError> {
    let state = State::open(path)?;
    let settings: Arc<dyn SettingsStore> = Arc::new(state.settings);

    if scope.token {
        TokenManager::new(settings.clone(), zone).clear()?;
    }
    if scope.zone_flag {
        settings.remove(&zone_created_key(zone))?;
    }
    if scope.subscriptions {
        settings.remove(&subscription_registry_key(zone))?;
    }
    tracing::info!(%zone, ?scope, "state reset");
    Ok(())
}
