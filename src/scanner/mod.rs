//! Scan engine: parallel traversal, Merkle-style change detection, and
//! atomic catalog commits.
//!
//! A scan runs in three phases: the walker produces fresh records and a list
//! of reused subtrees, the orchestrator copies reused records forward from
//! the baseline scan, and the whole record set commits as one catalog batch
//! before the scan row is finalized. Nothing is visible to readers until the
//! batch commits.

#![allow(missing_docs)]

pub mod fingerprint;
pub mod progress;
pub mod walker;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use chrono::Utc;

use crate::catalog::records::{DirectoryRecord, GrowthSample, Scan, ScanKind, ScanStatus, ScanTotals};
use crate::catalog::store::CatalogStore;
use crate::classify::{CategorySet, ExclusionSet};
use crate::core::config::ScannerConfig;
use crate::core::errors::{Result, WardenError};
use crate::core::paths::resolve_absolute_path;
use crate::scanner::progress::{NullSink, ProgressSink, ScanEvent};
use crate::scanner::walker::{PrevDirSummary, WalkOutcome, WalkRequest};

pub use walker::DirAggregate;

/// One scan invocation.
pub struct ScanRequest<'a> {
    pub root: &'a Path,
    pub exclusions: &'a ExclusionSet,
    /// Baseline scan id for incremental mode. Ignored (with a full-scan
    /// fallback) unless it names a complete scan of the same root.
    pub previous_scan: Option<i64>,
    /// Worker override; defaults to the configured pool size.
    pub workers: Option<usize>,
    /// Cooperative cancellation flag, checked between directories.
    pub cancel: Option<&'a AtomicBool>,
    /// Progress/warning sink; defaults to discarding.
    pub sink: Option<&'a dyn ProgressSink>,
}

impl<'a> ScanRequest<'a> {
    /// A full scan with default knobs.
    pub fn full(root: &'a Path, exclusions: &'a ExclusionSet) -> Self {
        Self {
            root,
            exclusions,
            previous_scan: None,
            workers: None,
            cancel: None,
            sink: None,
        }
    }
}

/// The scan engine. Stateless between scans; shares the immutable category
/// snapshot with every worker.
pub struct Scanner<'a> {
    config: &'a ScannerConfig,
    categories: &'a CategorySet,
}

impl<'a> Scanner<'a> {
    pub fn new(config: &'a ScannerConfig, categories: &'a CategorySet) -> Self {
        Self { config, categories }
    }

    /// Run a scan and persist it.
    ///
    /// Returns the finalized scan row. An interrupted walk still commits its
    /// finalized subtrees and finalizes the row as `interrupted`; a failed
    /// batch write rolls back every record and marks the row `failed`.
    pub fn scan(&self, catalog: &mut CatalogStore, request: &ScanRequest<'_>) -> Result<Scan> {
        let root = resolve_absolute_path(request.root);
        let null_sink = NullSink;
        let sink: &dyn ProgressSink = request.sink.unwrap_or(&null_sink);

        // Resolve the incremental baseline, falling back to a full scan when
        // the id is unusable (wrong root, incomplete, or missing).
        let baseline = self.resolve_baseline(catalog, request.previous_scan, &root)?;
        let kind = if baseline.is_some() {
            ScanKind::Incremental
        } else {
            ScanKind::Full
        };

        let scan_id = catalog.begin_scan(&root, kind, &request.exclusions.pattern_snapshot())?;

        let walk_request = WalkRequest {
            root: root.clone(),
            scan_id,
            config: self.config,
            categories: self.categories,
            exclusions: request.exclusions,
            previous: baseline.as_ref().map(|(_, summaries)| summaries),
            workers: request.workers.unwrap_or(self.config.workers),
            cancel: request.cancel,
            sink,
        };

        let mut outcome = match walker::walk(&walk_request) {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = catalog.finalize_scan(scan_id, ScanStatus::Failed, &ScanTotals::default());
                return Err(err);
            }
        };

        let mut directories = std::mem::take(&mut outcome.directories);
        let mut files = std::mem::take(&mut outcome.files);

        // Copy unchanged subtrees forward from the baseline: same content,
        // new scan id. Duplicate flags are re-derived inside the batch.
        if let Some((baseline_id, _)) = &baseline {
            for subtree in &outcome.reused_subtrees {
                let (mut prev_dirs, mut prev_files) = catalog.subtree_records(*baseline_id, subtree)?;
                for dir in &mut prev_dirs {
                    dir.scan_id = scan_id;
                }
                for file in &mut prev_files {
                    file.scan_id = scan_id;
                    file.is_duplicate = false;
                }
                directories.extend(prev_dirs);
                files.extend(prev_files);
            }
        }

        let growth = growth_samples(scan_id, &directories);

        if let Err(err) = catalog.write_scan_batch(scan_id, &directories, &files, &growth) {
            let _ = catalog.finalize_scan(scan_id, ScanStatus::Failed, &ScanTotals::default());
            return Err(err);
        }

        let status = if outcome.interrupted {
            ScanStatus::Interrupted
        } else {
            ScanStatus::Complete
        };
        let totals = compute_totals(&outcome, &directories);
        catalog.finalize_scan(scan_id, status, &totals)?;

        sink.emit(ScanEvent::Completed {
            files_processed: totals.file_count,
            directories_processed: totals.directory_count,
            total_size_bytes: totals.total_size_bytes,
            elapsed_ms: u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            status: status.as_str().to_string(),
        });

        catalog.scan(scan_id)?.ok_or_else(|| WardenError::Runtime {
            details: format!("scan {scan_id} vanished after finalize"),
        })
    }

    /// Validate the requested baseline and load its per-path summaries.
    fn resolve_baseline(
        &self,
        catalog: &CatalogStore,
        previous_scan: Option<i64>,
        root: &Path,
    ) -> Result<Option<(i64, BTreeMap<PathBuf, PrevDirSummary>)>> {
        let Some(id) = previous_scan else {
            return Ok(None);
        };
        let Some(prev) = catalog.scan(id)? else {
            return Ok(None);
        };
        if prev.status != ScanStatus::Complete || prev.root_path != root {
            return Ok(None);
        }

        let summaries: BTreeMap<PathBuf, PrevDirSummary> = catalog
            .directories_for_scan(id)?
            .iter()
            .map(|d| (d.path.clone(), PrevDirSummary::from_record(d)))
            .collect();
        if summaries.is_empty() {
            return Ok(None);
        }
        Ok(Some((id, summaries)))
    }
}

/// Scan totals from the walk outcome, tolerating an unfinalized root.
///
/// When the root finalized, its aggregate is authoritative. After an
/// interruption only maximal finalized subtrees exist; totals then sum the
/// recorded directories whose parent was never recorded.
fn compute_totals(outcome: &WalkOutcome, directories: &[DirectoryRecord]) -> ScanTotals {
    let directory_count = directories.len() as u64;

    if let Some(aggregate) = outcome.root_aggregate {
        return ScanTotals {
            file_count: aggregate.file_count,
            directory_count,
            total_size_bytes: aggregate.size_bytes,
            root_fingerprint: outcome.root_fingerprint.clone(),
        };
    }

    let recorded: std::collections::HashSet<&PathBuf> =
        directories.iter().map(|d| &d.path).collect();
    let mut totals = ScanTotals {
        directory_count,
        ..ScanTotals::default()
    };
    for dir in directories {
        let parent_recorded = dir
            .parent_path
            .as_ref()
            .is_some_and(|p| recorded.contains(p));
        if !parent_recorded {
            totals.file_count += dir.file_count;
            totals.total_size_bytes += dir.size_bytes;
        }
    }
    totals
}

/// One growth sample per category root: a categorized directory whose parent
/// is not in the same category. Sampling every nested row would just mirror
/// the directory table.
fn growth_samples(scan_id: i64, directories: &[DirectoryRecord]) -> Vec<GrowthSample> {
    let category_of: HashMap<&PathBuf, Option<&str>> = directories
        .iter()
        .map(|d| (&d.path, d.category.as_deref()))
        .collect();
    let now = Utc::now();

    directories
        .iter()
        .filter(|d| d.category.is_some())
        .filter(|d| {
            d.parent_path.as_ref().is_none_or(|parent| {
                category_of
                    .get(parent)
                    .copied()
                    .flatten()
                    .is_none_or(|parent_cat| Some(parent_cat) != d.category.as_deref())
            })
        })
        .map(|d| GrowthSample {
            scan_id,
            path: d.path.clone(),
            category: d.category.clone(),
            size_bytes: d.size_bytes,
            sampled_at: now,
        })
        .collect()
}
