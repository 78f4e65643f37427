//! Recoverable trash: the capability the cleanup executor moves targets
//! through instead of ever deleting permanently.
//!
//! [`FilesystemTrash`] mirrors each target's original path under a
//! batch-stamped directory, so `/Users/x/proj/node_modules` lands at
//! `<root>/<batch>/Users/x/proj/node_modules` and a rollback is a single
//! rename back.

#![allow(missing_docs)]

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;

use crate::core::errors::{Result, WardenError};

/// "Move this path to a recoverable location and return the new location."
///
/// Abstracts over the OS trash mechanism; the default implementation uses a
/// plain directory tree, which keeps restores portable and inspectable.
pub trait TrashBin: Send + Sync {
    /// Move `path` into the trash, returning its new location.
    fn stash(&self, path: &Path) -> Result<PathBuf>;

    /// Move a previously stashed item back to its original path.
    fn restore(&self, trashed: &Path, original: &Path) -> Result<()>;
}

/// Directory-tree trash under a configured root.
pub struct FilesystemTrash {
    root: PathBuf,
    batch_id: String,
}

impl FilesystemTrash {
    /// Open (creating if needed) a trash root and start a new batch.
    pub fn open(root: &Path) -> Result<Self> {
        let batch_id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            std::process::id()
        );
        let batch_dir = root.join(&batch_id);
        fs::create_dir_all(&batch_dir).map_err(|e| WardenError::io(&batch_dir, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            batch_id,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    fn destination_for(&self, original: &Path) -> PathBuf {
        let mut dest = self.root.join(&self.batch_id);
        dest.push(mirror_relative_path(original));
        dest
    }
}

impl TrashBin for FilesystemTrash {
    fn stash(&self, path: &Path) -> Result<PathBuf> {
        let mut destination = self.destination_for(path);

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| WardenError::io(parent, e))?;
        }

        // The mirror path is unique per batch unless the same path is
        // trashed, restored, and trashed again; uniquify for that case.
        let mut attempt = 1u32;
        while destination.exists() {
            let mut name = destination
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            name.push_str(&format!(".{attempt}"));
            destination = destination.with_file_name(name);
            attempt += 1;
        }

        fs::rename(path, &destination).map_err(|e| WardenError::io(path, e))?;
        Ok(destination)
    }

    fn restore(&self, trashed: &Path, original: &Path) -> Result<()> {
        if !trashed.exists() {
            return Err(WardenError::RollbackBlocked {
                path: original.to_path_buf(),
                details: format!("trash item is gone: {}", trashed.display()),
            });
        }
        if original.exists() {
            return Err(WardenError::RollbackBlocked {
                path: original.to_path_buf(),
                details: "original path already exists".to_string(),
            });
        }
        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent).map_err(|e| WardenError::io(parent, e))?;
        }
        fs::rename(trashed, original).map_err(|e| WardenError::io(trashed, e))
    }
}

/// Strip root/prefix components so an absolute path can nest inside the
/// batch directory.
fn mirror_relative_path(path: &Path) -> PathBuf {
    let mut rel = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                rel.push(prefix.as_os_str().to_string_lossy().replace(':', ""));
            }
            Component::RootDir => {}
            Component::CurDir | Component::ParentDir | Component::Normal(_) => {
                rel.push(component.as_os_str());
            }
        }
    }
    rel
}
