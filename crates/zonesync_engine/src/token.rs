//! Change token persistence.

use crate::error::SyncResult;
use crate::settings::{token_key, SettingsStore};
use std::sync::Arc;
use zonesync_protocol::ChangeToken;

/// Stores the fetch cursor of one zone.
pub struct TokenManager {
    settings: Arc<dyn SettingsStore>,
    key: String,
}

impl TokenManager {
    /// Creates a token manager for `zone_name`.
    pub fn new(settings: Arc<dyn SettingsStore>, zone_name: &str) -> Self {
        Self {
            settings,
            key: token_key(zone_name),
        }
    }

    /// Returns the persisted token. `None` means a full resync.
    pub fn change_token(&self) -> SyncResult<Option<ChangeToken>> {
        Ok(self
            .settings
            .get(&self.key)?
            .map(ChangeToken::from_bytes))
    }

    /// Persists `token`, or clears it when `None`.
    pub fn set_change_token(&self, token: Option<&ChangeToken>) -> SyncResult<()> {
        match token {
            Some(token) => self.settings.set(&self.key, token.as_bytes().to_vec()),
            None => self.settings.remove(&self.key),
        }
    }

    /// Clears the token, forcing the next fetch to start from scratch.
    pub fn clear(&self) -> SyncResult<()> {
        tracing::info!(key = %self.key, "clearing change token");
        self.set_change_token(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    #[test]
    fn token_lifecycle() {
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
        let tokens = TokenManager::new(settings.clone(), "Notes");
        assert!(tokens.change_token().unwrap().is_none());

        let token = ChangeToken::from_bytes(vec![9, 9, 9]);
        tokens.set_change_token(Some(&token)).unwrap();
        assert_eq!(tokens.change_token().unwrap(), Some(token));
        assert!(settings.get("TOKEN-Notes").unwrap().is_some());

        tokens.clear().unwrap();
        assert!(tokens.change_token().unwrap().is_none());
    }

    #[test]
    fn tokens_are_per_zone() {
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new());
        let notes = TokenManager::new(settings.clone(), "Notes");
        let photos = TokenManager::new(settings, "Photos");

        notes
            .set_change_token(Some(&ChangeToken::from_bytes(vec![1])))
            .unwrap();
        assert!(photos.change_token().unwrap().is_none());
    }
}
