//! Scan analysis: structural diffs, duplicate detection, growth rates, and
//! cleanup recommendations. Pure queries over the catalog — nothing here
//! touches the filesystem.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::catalog::records::FileRecord;
use crate::catalog::store::CatalogStore;
use crate::core::errors::{Result, WardenError};

/// Bytes per reported megabyte (binary, matching how sizes are displayed).
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A directory present in both scans whose fingerprint differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChange {
    pub path: PathBuf,
    pub size_before: u64,
    pub size_after: u64,
}

/// Path-by-path structural diff between two scans of the same root.
///
/// An unchanged fingerprint at a path is taken to mean an unchanged subtree,
/// the same assumption the scanner's incremental shortcut makes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    pub scan_a: i64,
    pub scan_b: i64,
    /// Directories present only in the newer scan.
    pub added: Vec<PathBuf>,
    /// Directories present only in the older scan.
    pub removed: Vec<PathBuf>,
    /// Directories whose fingerprint changed.
    pub changed: Vec<DirectoryChange>,
}

impl ChangeReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Files sharing one content hash within a scan.
///
/// Wasted bytes follow the keep-the-largest convention: everything except
/// the single largest member is reclaimable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub content_hash: String,
    pub files: Vec<FileRecord>,
    pub total_bytes: u64,
    pub wasted_bytes: u64,
}

/// One entry of the cleanup recommendation ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRecommendation {
    pub category: String,
    pub total_bytes: u64,
    pub directory_count: u64,
    pub priority: i64,
    pub restoration_hint: Option<String>,
}

/// Read-side analysis over a catalog.
pub struct Analyzer<'a> {
    catalog: &'a CatalogStore,
}

impl<'a> Analyzer<'a> {
    pub fn new(catalog: &'a CatalogStore) -> Self {
        Self { catalog }
    }

    /// Diff two scans of the same root, oldest first.
    pub fn compare(&self, scan_a: i64, scan_b: i64) -> Result<ChangeReport> {
        let a = self.require_scan(scan_a)?;
        let b = self.require_scan(scan_b)?;
        if a.root_path != b.root_path {
            return Err(WardenError::Runtime {
                details: format!(
                    "cannot compare scans of different roots: {} vs {}",
                    a.root_path.display(),
                    b.root_path.display()
                ),
            });
        }

        let dirs_a: BTreeMap<PathBuf, (String, u64)> = self
            .catalog
            .directories_for_scan(scan_a)?
            .into_iter()
            .map(|d| (d.path, (d.fingerprint, d.size_bytes)))
            .collect();
        let dirs_b: BTreeMap<PathBuf, (String, u64)> = self
            .catalog
            .directories_for_scan(scan_b)?
            .into_iter()
            .map(|d| (d.path, (d.fingerprint, d.size_bytes)))
            .collect();

        let mut report = ChangeReport {
            scan_a,
            scan_b,
            ..ChangeReport::default()
        };

        for (path, (fp_b, size_b)) in &dirs_b {
            match dirs_a.get(path) {
                None => report.added.push(path.clone()),
                Some((fp_a, size_a)) if fp_a != fp_b => report.changed.push(DirectoryChange {
                    path: path.clone(),
                    size_before: *size_a,
                    size_after: *size_b,
                }),
                Some(_) => {}
            }
        }
        for path in dirs_a.keys() {
            if !dirs_b.contains_key(path) {
                report.removed.push(path.clone());
            }
        }

        Ok(report)
    }

    /// Duplicate-file groups within one scan, largest waste first.
    pub fn find_duplicates(&self, scan_id: i64) -> Result<Vec<DuplicateGroup>> {
        let records = self.catalog.duplicate_file_records(scan_id)?;

        let mut by_hash: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();
        for record in records {
            let Some(hash) = record.content_hash.clone() else {
                continue;
            };
            by_hash.entry(hash).or_default().push(record);
        }

        let mut groups: Vec<DuplicateGroup> = by_hash
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(content_hash, files)| {
                let total_bytes: u64 = files.iter().map(|f| f.size_bytes).sum();
                let largest = files.iter().map(|f| f.size_bytes).max().unwrap_or(0);
                DuplicateGroup {
                    content_hash,
                    total_bytes,
                    wasted_bytes: total_bytes - largest,
                    files,
                }
            })
            .collect();

        groups.sort_by(|a, b| {
            b.wasted_bytes
                .cmp(&a.wasted_bytes)
                .then_with(|| a.content_hash.cmp(&b.content_hash))
        });
        Ok(groups)
    }

    /// Linear growth rate in MB/day between the oldest and newest size
    /// samples for a path within the last `k` scans. `None` with fewer than
    /// two samples or a degenerate time window.
    #[allow(clippy::cast_precision_loss)]
    pub fn growth_rate(&self, path: &Path, last_k_scans: u32) -> Result<Option<f64>> {
        let series = self.catalog.growth_series(path, last_k_scans)?;
        if series.len() < 2 {
            return Ok(None);
        }

        let oldest = &series[0];
        let newest = &series[series.len() - 1];
        let elapsed = newest.sampled_at - oldest.sampled_at;
        let days = elapsed.num_milliseconds() as f64 / 86_400_000.0;
        if days <= 0.0 {
            return Ok(None);
        }

        let delta_bytes = newest.size_bytes as f64 - oldest.size_bytes as f64;
        Ok(Some(delta_bytes / BYTES_PER_MB / days))
    }

    /// Deletable categories ranked by reclaimable bytes, tie-broken by
    /// configured priority descending, then name.
    pub fn recommend(&self, scan_id: i64) -> Result<Vec<CategoryRecommendation>> {
        let usage = self.catalog.deletable_usage_by_category(scan_id)?;

        let mut recommendations: Vec<CategoryRecommendation> = usage
            .into_iter()
            .map(|u| {
                let meta = self.catalog.category(&u.category).ok().flatten();
                CategoryRecommendation {
                    priority: meta.as_ref().map_or(0, |c| c.priority),
                    restoration_hint: meta.map(|c| c.restoration_hint),
                    category: u.category,
                    total_bytes: u.total_bytes,
                    directory_count: u.directory_count,
                }
            })
            .collect();

        recommendations.sort_by(|a, b| {
            b.total_bytes
                .cmp(&a.total_bytes)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(recommendations)
    }

    fn require_scan(&self, scan_id: i64) -> Result<crate::catalog::records::Scan> {
        self.catalog
            .scan(scan_id)?
            .ok_or_else(|| WardenError::Runtime {
                details: format!("scan {scan_id} not found"),
            })
    }
}
