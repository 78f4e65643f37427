//! Parallel post-order directory walker.
//!
//! A bounded worker pool pulls directories from a shared work queue. Each
//! worker enumerates one directory at a time: exclusions are applied before
//! descent, immediate files are measured (and content-hashed when eligible),
//! and child directories are queued. A directory is finalized — fingerprint
//! computed, aggregates fixed, record emitted — only after every child
//! directory has finalized, giving the fan-out/fan-in post-order join the
//! aggregation invariant requires. Sibling subtrees complete in any order.
//!
//! In incremental mode a directory whose recomputed shallow fingerprint
//! matches the previous scan is not descended; its prior aggregates are
//! reported upward and the orchestrator copies its records forward.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use crossbeam_channel as channel;
use parking_lot::Mutex;

use crate::catalog::records::{DirectoryRecord, FileRecord};
use crate::classify::{CategorySet, ExclusionSet};
use crate::core::config::ScannerConfig;
use crate::core::errors::{Result, WardenError};
use crate::scanner::fingerprint::{
    ChildKind, ChildTuple, Fingerprint, content_hash_file, directory_fingerprint,
    file_metadata_hash, hash_hex, parse_hex,
};
use crate::scanner::progress::{ProgressSink, ScanEvent, WarningKind};

/// Per-path summary of the previous scan, used for incremental shortcuts.
#[derive(Debug, Clone)]
pub struct PrevDirSummary {
    pub fingerprint: String,
    pub size_bytes: u64,
    pub file_count: u64,
    pub subdir_count: u64,
    pub modified_at: DateTime<Utc>,
}

impl PrevDirSummary {
    pub fn from_record(record: &DirectoryRecord) -> Self {
        Self {
            fingerprint: record.fingerprint.clone(),
            size_bytes: record.size_bytes,
            file_count: record.file_count,
            subdir_count: record.subdir_count,
            modified_at: record.modified_at,
        }
    }
}

/// Everything a walk needs, borrowed from the orchestrator.
pub struct WalkRequest<'a> {
    pub root: PathBuf,
    pub scan_id: i64,
    pub config: &'a ScannerConfig,
    pub categories: &'a CategorySet,
    pub exclusions: &'a ExclusionSet,
    /// Previous-scan summaries; `Some` enables the incremental shortcut.
    pub previous: Option<&'a BTreeMap<PathBuf, PrevDirSummary>>,
    pub workers: usize,
    pub cancel: Option<&'a AtomicBool>,
    pub sink: &'a dyn ProgressSink,
}

/// Recursive subtree aggregates carried up the fan-in chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirAggregate {
    pub size_bytes: u64,
    pub file_count: u64,
    pub subdir_count: u64,
}

impl DirAggregate {
    fn absorb_child_dir(&mut self, child: &Self) {
        self.size_bytes = self.size_bytes.saturating_add(child.size_bytes);
        self.file_count = self.file_count.saturating_add(child.file_count);
        self.subdir_count = self.subdir_count.saturating_add(child.subdir_count + 1);
    }
}

/// Result of one walk, before catalog commit.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub directories: Vec<DirectoryRecord>,
    pub files: Vec<FileRecord>,
    /// Roots of subtrees reused from the previous scan (records to copy forward).
    pub reused_subtrees: Vec<PathBuf>,
    pub root_fingerprint: Option<String>,
    pub root_aggregate: Option<DirAggregate>,
    /// Files enumerated live (excludes reused subtrees).
    pub files_seen: u64,
    pub elapsed: Duration,
    pub interrupted: bool,
}

/// Run the walk. Blocks until every worker drains.
pub fn walk(request: &WalkRequest<'_>) -> Result<WalkOutcome> {
    let root = crate::core::paths::resolve_absolute_path(&request.root);

    let root_meta = metadata_for_path(&root, request.config.follow_symlinks)
        .map_err(|e| WardenError::io(&root, e))?;
    if !root_meta.is_dir() {
        return Err(WardenError::Runtime {
            details: format!("scan root is not a directory: {}", root.display()),
        });
    }

    let shared = Shared::new(root.clone());

    if request.exclusions.is_excluded(&root) {
        // An excluded root yields an empty (but valid) scan.
        return Ok(shared.into_outcome(false));
    }

    let (work_tx, work_rx) = channel::unbounded::<WorkItem>();
    shared.in_flight.fetch_add(1, Ordering::Release);
    let _ = work_tx.send(WorkItem {
        path: root,
        depth: 0,
    });

    let workers = request.workers.max(1);
    thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let work_tx = work_tx.clone();
            let shared = &shared;
            scope.spawn(move || worker_loop(&work_rx, &work_tx, shared, request));
        }
        drop(work_tx);
    });

    let interrupted = request.cancel.is_some_and(|c| c.load(Ordering::Acquire));
    Ok(shared.into_outcome(interrupted))
}

// ──────────────────── shared walk state ────────────────────

struct WorkItem {
    path: PathBuf,
    depth: usize,
}

/// A directory waiting for child subtrees to finalize.
struct PendingDir {
    name: String,
    modified_at: DateTime<Utc>,
    pending: usize,
    tuples: Vec<ChildTuple>,
    aggregate: DirAggregate,
    /// File records held back until the directory finalizes, so a partial
    /// scan only ever contains files under fully aggregated directories.
    buffered_files: Vec<FileRecord>,
}

/// Finalization payload handed up the fan-in chain.
struct ReadyDir {
    path: PathBuf,
    name: String,
    modified_at: DateTime<Utc>,
    tuples: Vec<ChildTuple>,
    aggregate: DirAggregate,
    buffered_files: Vec<FileRecord>,
}

enum ChildReport {
    /// Child finalized: its tuple and aggregates flow into the parent.
    Finalized {
        tuple: ChildTuple,
        aggregate: DirAggregate,
    },
    /// Child skipped (unreadable, vanished): contributes nothing.
    Skipped,
}

struct Shared {
    root: PathBuf,
    states: Mutex<HashMap<PathBuf, PendingDir>>,
    directories: Mutex<Vec<DirectoryRecord>>,
    files: Mutex<Vec<FileRecord>>,
    reused: Mutex<Vec<PathBuf>>,
    visited: Mutex<HashSet<(u64, u64)>>,
    root_result: Mutex<Option<(String, DirAggregate)>>,
    files_seen: AtomicU64,
    in_flight: AtomicUsize,
    started: Instant,
}

impl Shared {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            states: Mutex::new(HashMap::new()),
            directories: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
            reused: Mutex::new(Vec::new()),
            visited: Mutex::new(HashSet::new()),
            root_result: Mutex::new(None),
            files_seen: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    fn into_outcome(self, interrupted: bool) -> WalkOutcome {
        let (root_fingerprint, root_aggregate) = self
            .root_result
            .into_inner()
            .map_or((None, None), |(fp, agg)| (Some(fp), Some(agg)));
        WalkOutcome {
            directories: self.directories.into_inner(),
            files: self.files.into_inner(),
            reused_subtrees: self.reused.into_inner(),
            root_fingerprint,
            root_aggregate,
            files_seen: self.files_seen.into_inner(),
            elapsed: self.started.elapsed(),
            interrupted,
        }
    }
}

// ──────────────────── worker loop ────────────────────

fn worker_loop(
    work_rx: &channel::Receiver<WorkItem>,
    work_tx: &channel::Sender<WorkItem>,
    shared: &Shared,
    request: &WalkRequest<'_>,
) {
    loop {
        match work_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(item) => {
                let cancelled = request
                    .cancel
                    .is_some_and(|c| c.load(Ordering::Acquire));
                if !cancelled {
                    process_directory(&item.path, item.depth, work_tx, shared, request);
                }
                // On cancellation the item is dropped without reporting to its
                // parent; unfinished ancestors simply never finalize.
                shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                if shared.in_flight.load(Ordering::Acquire) == 0 {
                    return;
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Child file captured during enumeration, before hashing decisions.
struct FileInfo {
    path: PathBuf,
    name: String,
    size_bytes: u64,
    modified: SystemTime,
}

#[allow(clippy::too_many_lines)]
fn process_directory(
    dir_path: &Path,
    depth: usize,
    work_tx: &channel::Sender<WorkItem>,
    shared: &Shared,
    request: &WalkRequest<'_>,
) {
    // Stat the target when following symlinks so the cycle guard tracks the
    // real (device, inode), not the link's.
    let meta = match metadata_for_path(dir_path, request.config.follow_symlinks) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            // Vanished between discovery and processing; nothing to report.
            report_and_cascade(shared, request, dir_path.to_path_buf(), ChildReport::Skipped);
            return;
        }
        Err(err) => {
            warn(request, warning_kind(&err), dir_path, &err.to_string());
            report_and_cascade(shared, request, dir_path.to_path_buf(), ChildReport::Skipped);
            return;
        }
    };

    let modified_at: DateTime<Utc> = meta
        .modified()
        .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
    let name = dir_name(dir_path);

    // Cycle guard: a (device, inode) pair seen twice means a looped or
    // hard-linked directory; record it as a non-descending leaf.
    if !shared.visited.lock().insert(dev_inode(&meta)) {
        warn(
            request,
            WarningKind::CycleDetected,
            dir_path,
            "directory already visited in this scan",
        );
        let ready = ReadyDir {
            path: dir_path.to_path_buf(),
            name,
            modified_at,
            tuples: Vec::new(),
            aggregate: DirAggregate::default(),
            buffered_files: Vec::new(),
        };
        let report = finalize_directory(shared, request, ready);
        report_and_cascade(shared, request, dir_path.to_path_buf(), report);
        return;
    }

    let entries = match fs::read_dir(dir_path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            report_and_cascade(shared, request, dir_path.to_path_buf(), ChildReport::Skipped);
            return;
        }
        Err(err) => {
            warn(request, warning_kind(&err), dir_path, &err.to_string());
            report_and_cascade(shared, request, dir_path.to_path_buf(), ChildReport::Skipped);
            return;
        }
    };

    // ─── Enumerate immediate children ───
    let mut child_files: Vec<FileInfo> = Vec::new();
    let mut child_dirs: Vec<PathBuf> = Vec::new();

    for entry_result in entries {
        let Ok(entry) = entry_result else {
            continue;
        };
        let child_path = entry.path();

        if request.exclusions.is_excluded(&child_path) {
            // Excluded children contribute neither records nor size.
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() && !request.config.follow_symlinks {
            continue;
        }

        let is_dir = if file_type.is_symlink() {
            fs::metadata(&child_path).map(|m| m.is_dir()).unwrap_or(false)
        } else {
            file_type.is_dir()
        };

        if is_dir {
            if depth < request.config.max_depth {
                child_dirs.push(child_path);
            }
            continue;
        }

        // Symlinked files only get here with follow_symlinks on; stat the
        // target so size and mtime describe real content.
        let child_meta = if file_type.is_symlink() {
            fs::metadata(&child_path)
        } else {
            entry.metadata()
        };
        match child_meta {
            Ok(child_meta) => {
                let child_name = dir_name(&child_path);
                child_files.push(FileInfo {
                    path: child_path,
                    name: child_name,
                    size_bytes: child_meta.len(),
                    modified: child_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                });
            }
            Err(err) => {
                warn(request, warning_kind(&err), &child_path, &err.to_string());
            }
        }
    }

    // File tuples are needed both for the live fingerprint and the
    // incremental shallow check.
    let file_tuples: Vec<ChildTuple> = child_files
        .iter()
        .map(|f| ChildTuple {
            name: f.name.clone(),
            kind: ChildKind::File,
            size_bytes: f.size_bytes,
            hash: file_metadata_hash(&f.name, f.size_bytes, f.modified),
        })
        .collect();

    // ─── Incremental shortcut ───
    if let Some(previous) = request.previous
        && let Some(reuse) = try_reuse(previous, dir_path, &name, &file_tuples, &child_dirs)
    {
        shared.reused.lock().push(dir_path.to_path_buf());
        report_and_cascade(shared, request, dir_path.to_path_buf(), reuse);
        return;
    }

    // ─── File records & counters ───
    let mut aggregate = DirAggregate::default();
    let mut buffered_files = Vec::new();

    for info in &child_files {
        aggregate.size_bytes = aggregate.size_bytes.saturating_add(info.size_bytes);
        aggregate.file_count += 1;

        let seen = shared.files_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % request.config.progress_interval_files == 0 {
            request.sink.emit(ScanEvent::Progress {
                files_processed: seen,
                directories_processed: shared.directories.lock().len() as u64,
                elapsed_ms: elapsed_ms(shared),
                current_path: dir_path.to_path_buf(),
            });
        }

        if let Some(record) = build_file_record(info, dir_path, request) {
            buffered_files.push(record);
        }
    }

    // ─── Post-order join ───
    if child_dirs.is_empty() {
        let ready = ReadyDir {
            path: dir_path.to_path_buf(),
            name,
            modified_at,
            tuples: file_tuples,
            aggregate,
            buffered_files,
        };
        let report = finalize_directory(shared, request, ready);
        report_and_cascade(shared, request, dir_path.to_path_buf(), report);
        return;
    }

    // Register the pending state BEFORE queueing children so a fast child
    // always finds its parent.
    {
        let mut states = shared.states.lock();
        states.insert(
            dir_path.to_path_buf(),
            PendingDir {
                name,
                modified_at,
                pending: child_dirs.len(),
                tuples: file_tuples,
                aggregate,
                buffered_files,
            },
        );
    }

    for child in child_dirs {
        shared.in_flight.fetch_add(1, Ordering::Release);
        if work_tx
            .send(WorkItem {
                path: child,
                depth: depth + 1,
            })
            .is_err()
        {
            shared.in_flight.fetch_sub(1, Ordering::Release);
        }
    }
}

/// Shallow fingerprint check against the previous scan.
///
/// Live file tuples plus the previous fingerprints of child directories are
/// hashed; a match means the immediate listing is unchanged and, by the
/// fingerprint assumption, the whole subtree can be reused. As a side
/// condition every child directory's live mtime must equal its recorded one
/// (entry churn one level down invalidates the shortcut, and the children
/// then run their own checks after the rescan descends). Millisecond
/// comparison: stored timestamps round-trip through RFC 3339 millis.
fn try_reuse(
    previous: &BTreeMap<PathBuf, PrevDirSummary>,
    dir_path: &Path,
    name: &str,
    file_tuples: &[ChildTuple],
    child_dirs: &[PathBuf],
) -> Option<ChildReport> {
    let prev = previous.get(dir_path)?;
    let prev_fp: Fingerprint = parse_hex(&prev.fingerprint)?;

    let mut tuples: Vec<ChildTuple> = file_tuples.to_vec();
    for child in child_dirs {
        let child_prev = previous.get(child)?;
        let live_meta = fs::symlink_metadata(child).ok()?;
        let live_mtime = DateTime::<Utc>::from(live_meta.modified().ok()?);
        if live_mtime.timestamp_millis() != child_prev.modified_at.timestamp_millis() {
            return None;
        }
        tuples.push(ChildTuple {
            name: dir_name(child),
            kind: ChildKind::Directory,
            size_bytes: child_prev.size_bytes,
            hash: parse_hex(&child_prev.fingerprint)?,
        });
    }

    if directory_fingerprint(&tuples) != prev_fp {
        return None;
    }

    Some(ChildReport::Finalized {
        tuple: ChildTuple {
            name: name.to_string(),
            kind: ChildKind::Directory,
            size_bytes: prev.size_bytes,
            hash: prev_fp,
        },
        aggregate: DirAggregate {
            size_bytes: prev.size_bytes,
            file_count: prev.file_count,
            subdir_count: prev.subdir_count,
        },
    })
}

fn build_file_record(
    info: &FileInfo,
    parent: &Path,
    request: &WalkRequest<'_>,
) -> Option<FileRecord> {
    let is_large = info.size_bytes >= request.config.large_file_bytes;
    let hash_eligible = info.size_bytes >= request.config.content_hash_min_bytes;
    if !is_large && !hash_eligible {
        return None;
    }

    let content_hash = if hash_eligible {
        match content_hash_file(&info.path) {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn(
                    request,
                    WarningKind::Unreadable,
                    &info.path,
                    &err.to_string(),
                );
                None
            }
        }
    } else {
        None
    };

    Some(FileRecord {
        scan_id: request.scan_id,
        path: info.path.clone(),
        parent_path: parent.to_path_buf(),
        name: info.name.clone(),
        extension: info
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned()),
        size_bytes: info.size_bytes,
        modified_at: DateTime::<Utc>::from(info.modified),
        content_hash,
        is_large,
        is_duplicate: false,
    })
}

/// Compute a directory's fingerprint and emit its record; returns the report
/// for its parent.
fn finalize_directory(
    shared: &Shared,
    request: &WalkRequest<'_>,
    ready: ReadyDir,
) -> ChildReport {
    let fingerprint = directory_fingerprint(&ready.tuples);
    let fingerprint_hex = hash_hex(&fingerprint);

    let category = request.categories.classify(&ready.path);
    let record = DirectoryRecord {
        scan_id: request.scan_id,
        path: ready.path.clone(),
        parent_path: if ready.path == shared.root {
            None
        } else {
            ready.path.parent().map(Path::to_path_buf)
        },
        name: ready.name.clone(),
        size_bytes: ready.aggregate.size_bytes,
        file_count: ready.aggregate.file_count,
        subdir_count: ready.aggregate.subdir_count,
        modified_at: ready.modified_at,
        scanned_at: Utc::now(),
        fingerprint: fingerprint_hex,
        category: category.map(|c| c.name.clone()),
        is_deletable: category.is_some_and(|c| c.deletable),
    };

    if ready.aggregate.size_bytes >= request.config.large_directory_warn_bytes {
        warn(
            request,
            WarningKind::LargeDirectory,
            &ready.path,
            &format!("aggregate size {} bytes", ready.aggregate.size_bytes),
        );
    }

    shared.files.lock().extend(ready.buffered_files);
    shared.directories.lock().push(record);

    ChildReport::Finalized {
        tuple: ChildTuple {
            name: ready.name,
            kind: ChildKind::Directory,
            size_bytes: ready.aggregate.size_bytes,
            hash: fingerprint,
        },
        aggregate: ready.aggregate,
    }
}

/// Propagate a child's completion (or skip) up the fan-in chain, finalizing
/// every ancestor whose last pending child this was.
fn report_and_cascade(
    shared: &Shared,
    request: &WalkRequest<'_>,
    mut path: PathBuf,
    mut report: ChildReport,
) {
    loop {
        if path == shared.root {
            if let ChildReport::Finalized { tuple, aggregate } = report {
                *shared.root_result.lock() = Some((hash_hex(&tuple.hash), aggregate));
            }
            return;
        }

        let Some(parent) = path.parent().map(Path::to_path_buf) else {
            return;
        };

        let ready = {
            let mut states = shared.states.lock();
            let Some(state) = states.get_mut(&parent) else {
                return;
            };
            if let ChildReport::Finalized { tuple, aggregate } = &report {
                state.tuples.push(tuple.clone());
                state.aggregate.absorb_child_dir(aggregate);
            }
            state.pending -= 1;
            if state.pending == 0 {
                states.remove(&parent).map(|state| ReadyDir {
                    path: parent.clone(),
                    name: state.name,
                    modified_at: state.modified_at,
                    tuples: state.tuples,
                    aggregate: state.aggregate,
                    buffered_files: state.buffered_files,
                })
            } else {
                None
            }
        };

        match ready {
            Some(ready) => {
                report = finalize_directory(shared, request, ready);
                path = parent;
            }
            None => return,
        }
    }
}

// ──────────────────── helpers ────────────────────

fn metadata_for_path(path: &Path, follow_symlinks: bool) -> std::io::Result<fs::Metadata> {
    if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |n| n.to_string_lossy().into_owned(),
    )
}

fn dev_inode(meta: &fs::Metadata) -> (u64, u64) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        (meta.dev(), meta.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        (0, 0)
    }
}

fn warning_kind(err: &std::io::Error) -> WarningKind {
    if err.kind() == ErrorKind::PermissionDenied {
        WarningKind::PermissionDenied
    } else {
        WarningKind::Unreadable
    }
}

fn warn(request: &WalkRequest<'_>, kind: WarningKind, path: &Path, detail: &str) {
    request.sink.emit(ScanEvent::Warning {
        kind,
        path: path.to_path_buf(),
        detail: detail.to_string(),
    });
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(shared: &Shared) -> u64 {
    shared.started.elapsed().as_millis() as u64
}

// ──────────────────── tests ────────────────────
