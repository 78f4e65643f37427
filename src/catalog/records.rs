//! Catalog entity types.
//!
//! Every directory/file record belongs to exactly one scan; a re-scan
//! produces new rows rather than mutating old ones, so the path+time axis
//! stays usable for comparisons.

#![allow(missing_docs)]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of traversal produced a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Full,
    Incremental,
}

impl ScanKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "full" => Some(Self::Full),
            "incremental" => Some(Self::Incremental),
            _ => None,
        }
    }
}

/// Lifecycle state of a scan row.
///
/// `Interrupted` is a usable outcome, not a failure: already-committed
/// records stay valid and totals reflect what was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Complete,
    Interrupted,
    Failed,
}

impl ScanStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "complete" => Some(Self::Complete),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One traversal run. Immutable once finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub id: i64,
    pub root_path: PathBuf,
    pub kind: ScanKind,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub file_count: u64,
    pub directory_count: u64,
    pub total_size_bytes: u64,
    pub root_fingerprint: Option<String>,
    /// Active exclusion patterns at scan time.
    pub exclusion_snapshot: Vec<String>,
}

/// Aggregate totals written when a scan is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanTotals {
    pub file_count: u64,
    pub directory_count: u64,
    pub total_size_bytes: u64,
    pub root_fingerprint: Option<String>,
}

/// One directory observed in exactly one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub scan_id: i64,
    pub path: PathBuf,
    pub parent_path: Option<PathBuf>,
    pub name: String,
    pub size_bytes: u64,
    pub file_count: u64,
    pub subdir_count: u64,
    pub modified_at: DateTime<Utc>,
    pub scanned_at: DateTime<Utc>,
    /// Hex SHA-256 over the sorted immediate-child tuple list.
    pub fingerprint: String,
    pub category: Option<String>,
    pub is_deletable: bool,
}

/// One file of interest (large or duplicate-detection eligible) in one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub scan_id: i64,
    pub path: PathBuf,
    pub parent_path: PathBuf,
    pub name: String,
    pub extension: Option<String>,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    /// Full content hash; only computed above the configured size threshold.
    pub content_hash: Option<String>,
    pub is_large: bool,
    pub is_duplicate: bool,
}

/// What the cleanup executor did to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupAction {
    Trash,
    Delete,
    Rollback,
}

impl CleanupAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trash => "trash",
            Self::Delete => "delete",
            Self::Rollback => "rollback",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "trash" => Some(Self::Trash),
            "delete" => Some(Self::Delete),
            "rollback" => Some(Self::Rollback),
            _ => None,
        }
    }
}

/// Append-only audit record of a deletion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupHistoryEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub category: Option<String>,
    pub action: CleanupAction,
    pub success: bool,
    pub error: Option<String>,
    pub trash_path: Option<PathBuf>,
    pub restorable: bool,
}

/// Payload for a new cleanup-history append (id/timestamp assigned by store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCleanupEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub category: Option<String>,
    pub action: CleanupAction,
    pub success: bool,
    pub error: Option<String>,
    pub trash_path: Option<PathBuf>,
    pub restorable: bool,
}

/// One (path, category, scan) size observation for growth tracking.
/// Derived data; safe to recompute from directory history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrowthSample {
    pub scan_id: i64,
    pub path: PathBuf,
    pub category: Option<String>,
    pub size_bytes: u64,
    pub sampled_at: DateTime<Utc>,
}
