//! CLI command implementations.

pub mod inspect;
pub mod pending;
pub mod reset;

use std::path::Path;
use thiserror::Error;
use zonesync_engine::{FileSettingsStore, PendingOperationsManager, StateDir, SyncError};

/// Failures shared by the commands.
#[derive(Error, Debug)]
pub enum CommandError {
    /// No state directory at the given path.
    #[error("no sync state found at {0}")]
    NotFound(String),

    /// The engine rejected or failed an operation on its state.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// The on-disk state of one engine, opened under its lock.
pub struct State {
    /// The locked directory.
    pub dir: StateDir,
    /// Persisted settings.
    pub settings: FileSettingsStore,
}

impl State {
    /// Opens an existing state directory. Fails with
    /// [`SyncError::StateLocked`] while an engine is using it.
    pub fn open(path: &Path) -> Result<Self, CommandError> {
        if !path.is_dir() {
            return Err(CommandError::NotFound(path.display().to_string()));
        }
        let dir = StateDir::open(path)?;
        let settings = FileSettingsStore::open(&dir)?;
        Ok(Self { dir, settings })
    }

    /// Opens the pending operations queue.
    pub fn pending(&self) -> Result<PendingOperationsManager, CommandError> {
        Ok(PendingOperationsManager::open(&self.dir.pending_dir())?)
    }
}
