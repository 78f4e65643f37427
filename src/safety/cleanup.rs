//! Cleanup executor: trash moves with an unconditional audit trail.
//!
//! Every `execute` call writes exactly one cleanup-history row, success or
//! failure, through the catalog's standalone atomic append — the audit
//! record never depends on any other write. Failures are recorded and
//! surfaced; nothing here retries on its own. `rollback` appends a
//! compensating entry and never mutates the original.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::catalog::records::{CleanupAction, CleanupHistoryEntry, NewCleanupEntry};
use crate::catalog::store::CatalogStore;
use crate::core::errors::{Result, WardenError};
use crate::safety::trash::TrashBin;
use crate::safety::validator::ApprovedCandidate;

/// The executor. Cleanups on one path are serialized; different paths run
/// independently.
pub struct CleanupExecutor<'a> {
    catalog: &'a CatalogStore,
    trash: &'a dyn TrashBin,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl<'a> CleanupExecutor<'a> {
    pub fn new(catalog: &'a CatalogStore, trash: &'a dyn TrashBin) -> Self {
        Self {
            catalog,
            trash,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Move an approved candidate to the trash and record the outcome.
    ///
    /// Returns the audit entry; `Err` only for a concurrent attempt on the
    /// same path or a failed audit append. A failed move is a *successful*
    /// call whose entry carries `success = false` and the error message.
    pub fn execute(&self, candidate: &ApprovedCandidate) -> Result<CleanupHistoryEntry> {
        let _guard = PathGuard::acquire(&self.in_flight, &candidate.path)?;

        // Size is captured before the move; afterwards there is nothing left
        // to measure at the original path.
        let size_bytes = measure(&candidate.path);

        let (success, error, trash_path) = match self.trash.stash(&candidate.path) {
            Ok(destination) => (true, None, Some(destination)),
            Err(err) => (false, Some(err.to_string()), None),
        };

        self.catalog.append_cleanup_entry(&NewCleanupEntry {
            path: candidate.path.clone(),
            size_bytes,
            category: Some(candidate.category.clone()),
            action: CleanupAction::Trash,
            success,
            error,
            restorable: trash_path.is_some(),
            trash_path,
        })
    }

    /// Move a trashed item back to its original path, appending a
    /// compensating `rollback` entry.
    ///
    /// Entries that never produced a restorable trash item are not eligible;
    /// that is a caller error, not an audited outcome.
    pub fn rollback(&self, entry: &CleanupHistoryEntry) -> Result<CleanupHistoryEntry> {
        if entry.action != CleanupAction::Trash {
            return Err(WardenError::RollbackBlocked {
                path: entry.path.clone(),
                details: format!("entry {} is not a trash action", entry.id),
            });
        }
        let Some(trash_path) = entry.trash_path.as_ref().filter(|_| entry.restorable) else {
            return Err(WardenError::RollbackBlocked {
                path: entry.path.clone(),
                details: format!("entry {} has no restorable trash item", entry.id),
            });
        };

        let _guard = PathGuard::acquire(&self.in_flight, &entry.path)?;

        let (success, error) = match self.trash.restore(trash_path, &entry.path) {
            Ok(()) => (true, None),
            Err(err) => (false, Some(err.to_string())),
        };

        self.catalog.append_cleanup_entry(&NewCleanupEntry {
            path: entry.path.clone(),
            size_bytes: entry.size_bytes,
            category: entry.category.clone(),
            action: CleanupAction::Rollback,
            success,
            error,
            trash_path: Some(trash_path.clone()),
            // After a successful restore nothing remains in the trash.
            restorable: !success,
        })
    }
}

/// RAII marker for the per-path serialization set.
struct PathGuard<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl<'a> PathGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<PathBuf>>, path: &Path) -> Result<Self> {
        if !set.lock().insert(path.to_path_buf()) {
            return Err(WardenError::CleanupConflict {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            set,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}

/// Total size of a file or directory tree, skipping unreadable entries.
fn measure(path: &Path) -> u64 {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return 0;
    };
    if !meta.is_dir() {
        return meta.len();
    }

    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total = total.saturating_add(meta.len());
            }
        }
    }
    total
}
