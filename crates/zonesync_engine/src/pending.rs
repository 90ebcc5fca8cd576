//! Durable queue of operations deferred while offline.

use crate::error::SyncResult;
use crate::settings::write_atomic;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PENDING_FILE: &str = "pending_operations.json";

/// Work deferred until the sync preconditions hold again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingOperation {
    /// Delete these records.
    Deletion {
        /// Record names (model ids) to delete.
        record_ids: Vec<String>,
    },
}

/// File-backed queue of [`PendingOperation`]s.
///
/// Every mutation rewrites the file before returning.
pub struct PendingOperationsManager {
    path: PathBuf,
    operations: Mutex<Vec<PendingOperation>>,
}

impl PendingOperationsManager {
    /// Opens the queue stored in `dir`, creating the directory if needed.
    ///
    /// A missing file yields an empty queue. A file that cannot be parsed is
    /// logged, kept aside as `pending_operations.json.corrupt`, and the
    /// queue starts empty.
    pub fn open(dir: &Path) -> SyncResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(PENDING_FILE);
        let operations = load(&path)?;
        tracing::debug!(count = operations.len(), "loaded pending operations");
        Ok(Self {
            path,
            operations: Mutex::new(operations),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues a deletion of `ids`.
    pub fn add_pending_deletions(&self, ids: Vec<String>) -> SyncResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        tracing::info!(count = ids.len(), "queueing pending deletions");
        let mut operations = self.operations.lock();
        operations.push(PendingOperation::Deletion { record_ids: ids });
        self.persist(&operations)
    }

    /// Every queued deletion id, deduplicated, in first-queued order.
    pub fn pending_deletions(&self) -> Vec<String> {
        let operations = self.operations.lock();
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for operation in operations.iter() {
            let PendingOperation::Deletion { record_ids } = operation;
            for id in record_ids {
                if seen.insert(id.as_str()) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Removes `ids` from every queued deletion and drops operations left
    /// empty.
    pub fn remove_pending_deletions(&self, ids: &[String]) -> SyncResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let confirmed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut operations = self.operations.lock();
        for operation in operations.iter_mut() {
            let PendingOperation::Deletion { record_ids } = operation;
            record_ids.retain(|id| !confirmed.contains(id.as_str()));
        }
        operations.retain(|operation| match operation {
            PendingOperation::Deletion { record_ids } => !record_ids.is_empty(),
        });
        self.persist(&operations)
    }

    /// Returns a copy of the queue.
    pub fn operations(&self) -> Vec<PendingOperation> {
        self.operations.lock().clone()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.lock().is_empty()
    }

    /// Drops every queued operation.
    pub fn clear(&self) -> SyncResult<()> {
        let mut operations = self.operations.lock();
        operations.clear();
        self.persist(&operations)
    }

    fn persist(&self, operations: &[PendingOperation]) -> SyncResult<()> {
        let data = serde_json::to_vec_pretty(operations)?;
        write_atomic(&self.path, &data)
    }
}

fn load(path: &Path) -> SyncResult<Vec<PendingOperation>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice(&data) {
        Ok(operations) => Ok(operations),
        Err(e) => {
            let corrupt = path.with_extension("json.corrupt");
            tracing::error!(
                path = %path.display(),
                error = %e,
                "pending operations file is corrupt, starting empty"
            );
            fs::rename(path, &corrupt)?;
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_file_is_empty_queue() {
        let temp = tempdir().unwrap();
        let pending = PendingOperationsManager::open(temp.path()).unwrap();
        assert!(pending.is_empty());
        assert!(pending.pending_deletions().is_empty());
    }

    #[test]
    fn deletions_survive_reopen() {
        let temp = tempdir().unwrap();
        {
            let pending = PendingOperationsManager::open(temp.path()).unwrap();
            pending.add_pending_deletions(ids(&["a", "b"])).unwrap();
            pending.add_pending_deletions(ids(&["c"])).unwrap();
        }

        let pending = PendingOperationsManager::open(temp.path()).unwrap();
        assert_eq!(pending.pending_deletions(), ids(&["a", "b", "c"]));
        assert_eq!(pending.operations().len(), 2);
    }

    #[test]
    fn partial_removal_keeps_unconfirmed_ids() {
        let temp = tempdir().unwrap();
        let pending = PendingOperationsManager::open(temp.path()).unwrap();
        pending.add_pending_deletions(ids(&["a", "b"])).unwrap();
        pending.add_pending_deletions(ids(&["c"])).unwrap();

        pending.remove_pending_deletions(&ids(&["a", "c"])).unwrap();
        assert_eq!(pending.pending_deletions(), ids(&["b"]));
        assert_eq!(
            pending.operations(),
            vec![PendingOperation::Deletion {
                record_ids: ids(&["b"])
            }]
        );
    }

    #[test]
    fn duplicate_ids_are_flattened_once() {
        let temp = tempdir().unwrap();
        let pending = PendingOperationsManager::open(temp.path()).unwrap();
        pending.add_pending_deletions(ids(&["a", "b"])).unwrap();
        pending.add_pending_deletions(ids(&["b", "a"])).unwrap();

        assert_eq!(pending.pending_deletions(), ids(&["a", "b"]));
        pending.remove_pending_deletions(&ids(&["a", "b"])).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn file_format_is_tagged_json() {
        let temp = tempdir().unwrap();
        let pending = PendingOperationsManager::open(temp.path()).unwrap();
        pending.add_pending_deletions(ids(&["a"])).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(pending.path()).unwrap()).unwrap();
        assert_eq!(value[0]["type"], "deletion");
        assert_eq!(value[0]["record_ids"][0], "a");
    }

    #[test]
    fn corrupt_file_is_set_aside() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(PENDING_FILE), b"{not json").unwrap();

        let pending = PendingOperationsManager::open(temp.path()).unwrap();
        assert!(pending.is_empty());
        assert!(temp.path().join("pending_operations.json.corrupt").exists());

        pending.add_pending_deletions(ids(&["a"])).unwrap();
        let reopened = PendingOperationsManager::open(temp.path()).unwrap();
        assert_eq!(reopened.pending_deletions(), ids(&["a"]));
    }

    #[derive(Debug, Clone)]
    enum QueueOp {
        Add(Vec<String>),
        Remove(Vec<String>),
    }

    fn queue_op() -> impl Strategy<Value = QueueOp> {
        let id = prop::sample::select(vec!["a", "b", "c", "d", "e", "f"]).prop_map(String::from);
        prop_oneof![
            prop::collection::vec(id.clone(), 0..4).prop_map(QueueOp::Add),
            prop::collection::vec(id, 0..4).prop_map(QueueOp::Remove),
        ]
    }

    proptest! {
        #[test]
        fn queue_matches_set_model(ops in prop::collection::vec(queue_op(), 0..30)) {
            let temp = tempdir().unwrap();
            let pending = PendingOperationsManager::open(temp.path()).unwrap();
            let mut model: Vec<String> = Vec::new();

            for op in ops {
                match op {
                    QueueOp::Add(ids) => {
                        for id in &ids {
                            if !model.contains(id) {
                                model.push(id.clone());
                            }
                        }
                        pending.add_pending_deletions(ids).unwrap();
                    }
                    QueueOp::Remove(ids) => {
                        model.retain(|id| !ids.contains(id));
                        pending.remove_pending_deletions(&ids).unwrap();
                    }
                }
            }

            let mut actual = pending.pending_deletions();
            let mut expected = model.clone();
            actual.sort();
            expected.sort();
            prop_assert_eq!(&actual, &expected);

            drop(pending);
            let reopened = PendingOperationsManager::open(temp.path()).unwrap();
            let mut reloaded = reopened.pending_deletions();
            reloaded.sort();
            prop_assert_eq!(reloaded, expected);
        }
    }
}
