//! Persisted engine settings and the state directory.
//!
//! The state directory looks like:
//!
//! ```text
//! <state_dir>/
//! ├─ LOCK                     # Advisory lock, one engine per directory
//! ├─ settings.cbor            # Tokens, zone flag, subscription registry
//! ├─ Assets/                  # Staged large payloads
//! └─ PendingOperations/
//!    └─ pending_operations.json
//! ```

use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const SETTINGS_FILE: &str = "settings.cbor";
const PENDING_DIR: &str = "PendingOperations";

/// Key of the change token for a zone.
pub fn token_key(zone_name: &str) -> String {
    format!("TOKEN-{zone_name}")
}

/// Key of the "zone created" flag for a zone.
pub fn zone_created_key(zone_name: &str) -> String {
    format!("CREATEDZONE-{zone_name}")
}

/// Key of the subscription registry for a zone.
pub fn subscription_registry_key(zone_name: &str) -> String {
    format!("CREATEDSUBDB-{zone_name}")
}

/// Small key/value store for engine bookkeeping.
pub trait SettingsStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> SyncResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, durably.
    fn set(&self, key: &str, value: Vec<u8>) -> SyncResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> SyncResult<()>;

    /// Lists every stored key.
    fn keys(&self) -> SyncResult<Vec<String>>;

    /// Reads a boolean flag; missing keys read as `false`.
    fn get_flag(&self, key: &str) -> SyncResult<bool> {
        Ok(matches!(self.get(key)?.as_deref(), Some([1])))
    }

    /// Writes a boolean flag.
    fn set_flag(&self, key: &str, value: bool) -> SyncResult<()> {
        self.set(key, vec![u8::from(value)])
    }
}

/// In-memory settings, for tests and ephemeral engines.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySettingsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> SyncResult<Option<Vec<u8>>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> SyncResult<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> SyncResult<Vec<String>> {
        Ok(self.values.lock().keys().cloned().collect())
    }
}

/// Settings persisted as a CBOR map in the state directory.
///
/// Every write rewrites the whole file with write-then-rename.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl FileSettingsStore {
    /// Opens the settings file of `dir`, starting empty if it is missing.
    pub fn open(dir: &StateDir) -> SyncResult<Self> {
        let path = dir.path().join(SETTINGS_FILE);
        let values = if path.exists() {
            let file = File::open(&path)?;
            ciborium::from_reader(file)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn persist(&self, values: &BTreeMap<String, Vec<u8>>) -> SyncResult<()> {
        let mut data = Vec::new();
        ciborium::into_writer(values, &mut data)?;
        write_atomic(&self.path, &data)
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &str) -> SyncResult<Option<Vec<u8>>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> SyncResult<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> SyncResult<()> {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }

    fn keys(&self) -> SyncResult<Vec<String>> {
        Ok(self.values.lock().keys().cloned().collect())
    }
}

/// An engine state directory, held under an exclusive advisory lock.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct StateDir {
    path: PathBuf,
    _lock_file: File,
}

impl StateDir {
    /// Opens or creates a state directory.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StateLocked`] if another process holds the lock.
    pub fn open(path: &Path) -> SyncResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(SyncError::StateLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the pending operations file.
    pub fn pending_dir(&self) -> PathBuf {
        self.path.join(PENDING_DIR)
    }
}

/// Writes `data` to `path` crash-safely: temp file, fsync, rename, then
/// fsync of the parent directory.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> SyncResult<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;

    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> SyncResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> SyncResult<()> {
    // NTFS journals directory metadata
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn keys_are_scoped_by_zone() {
        assert_eq!(token_key("Notes"), "TOKEN-Notes");
        assert_eq!(zone_created_key("Notes"), "CREATEDZONE-Notes");
        assert_eq!(subscription_registry_key("Notes"), "CREATEDSUBDB-Notes");
    }

    #[test]
    fn memory_store_flags() {
        let store = MemorySettingsStore::new();
        assert!(!store.get_flag("flag").unwrap());
        store.set_flag("flag", true).unwrap();
        assert!(store.get_flag("flag").unwrap());
        store.remove("flag").unwrap();
        assert!(!store.get_flag("flag").unwrap());
    }

    #[test]
    fn file_store_survives_reopen() {
        let temp = tempdir().unwrap();

        {
            let dir = StateDir::open(temp.path()).unwrap();
            let store = FileSettingsStore::open(&dir).unwrap();
            store.set("TOKEN-Notes", vec![1, 2, 3]).unwrap();
            store.set_flag("CREATEDZONE-Notes", true).unwrap();
        }

        let dir = StateDir::open(temp.path()).unwrap();
        let store = FileSettingsStore::open(&dir).unwrap();
        assert_eq!(store.get("TOKEN-Notes").unwrap(), Some(vec![1, 2, 3]));
        assert!(store.get_flag("CREATEDZONE-Notes").unwrap());
        assert_eq!(store.keys().unwrap().len(), 2);
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _dir = StateDir::open(temp.path()).unwrap();

        let result = StateDir::open(temp.path());
        assert!(matches!(result, Err(SyncError::StateLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _dir = StateDir::open(temp.path()).unwrap();
        }
        let _dir = StateDir::open(temp.path()).unwrap();
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("data.json");
        write_atomic(&path, b"[]").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"[]");
        assert!(!temp.path().join("data.tmp").exists());
    }
}
