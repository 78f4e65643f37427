//! SQLite catalog store: WAL-mode database, prepared statements, and a single
//! serialized transaction per scan batch.
//!
//! All multi-row writes for one scan go through [`CatalogStore::write_scan_batch`],
//! which commits atomically or rolls back completely, reporting the path being
//! written at the point of failure. Cleanup-history inserts are always atomic
//! single-row appends so an audit record's durability never depends on an
//! unrelated batch.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OpenFlags, Row, params};

use crate::catalog::records::{
    CleanupAction, CleanupHistoryEntry, DirectoryRecord, FileRecord, GrowthSample, NewCleanupEntry,
    Scan, ScanKind, ScanStatus, ScanTotals,
};
use crate::classify::Category;
use crate::classify::ExclusionRule;
use crate::core::errors::{Result, WardenError};

/// Reclaimable-bytes aggregate for one category within one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryUsage {
    pub category: String,
    pub total_bytes: u64,
    pub directory_count: u64,
}

/// The persistent catalog.
pub struct CatalogStore {
    conn: Connection,
    path: PathBuf,
}

impl CatalogStore {
    /// Open (or create) the catalog at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WardenError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn)?;
        apply_schema(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// In-memory catalog for tests and throwaway analysis.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas_memory(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the underlying connection (for maintenance and tests).
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }

    // ──────────────────── scans ────────────────────

    /// Create a new scan row in `running` state, returning its id.
    pub fn begin_scan(
        &self,
        root_path: &Path,
        kind: ScanKind,
        exclusion_snapshot: &[String],
    ) -> Result<i64> {
        let snapshot = serde_json::to_string(exclusion_snapshot)?;
        self.conn
            .prepare_cached(
                "INSERT INTO scans (root_path, kind, status, started_at, exclusion_snapshot)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                path_str(root_path),
                kind.as_str(),
                ScanStatus::Running.as_str(),
                ts_string(&Utc::now()),
                snapshot,
            ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Finalize a scan: set status, totals, root fingerprint, and end time.
    /// The row is immutable afterwards by convention; nothing else writes it.
    pub fn finalize_scan(
        &self,
        scan_id: i64,
        status: ScanStatus,
        totals: &ScanTotals,
    ) -> Result<()> {
        let finished = Utc::now();
        let updated = self
            .conn
            .prepare_cached(
                "UPDATE scans SET
                    status = ?2,
                    finished_at = ?3,
                    duration_ms = CAST((julianday(?3) - julianday(started_at)) * 86400000.0 AS INTEGER),
                    file_count = ?4,
                    directory_count = ?5,
                    total_size_bytes = ?6,
                    root_fingerprint = ?7
                 WHERE id = ?1",
            )?
            .execute(params![
                scan_id,
                status.as_str(),
                ts_string(&finished),
                to_i64(totals.file_count),
                to_i64(totals.directory_count),
                to_i64(totals.total_size_bytes),
                totals.root_fingerprint,
            ])?;
        if updated == 0 {
            return Err(WardenError::Sql {
                context: "finalize_scan",
                details: format!("scan id {scan_id} does not exist"),
            });
        }
        Ok(())
    }

    /// Fetch one scan by id.
    pub fn scan(&self, scan_id: i64) -> Result<Option<Scan>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![scan_id], scan_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Most recent scan for a root path, regardless of status.
    pub fn latest_scan(&self, root_path: &Path) -> Result<Option<Scan>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE root_path = ?1
             ORDER BY id DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![path_str(root_path)], scan_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Most recent `complete` scan for a root path (the incremental baseline).
    pub fn latest_complete_scan(&self, root_path: &Path) -> Result<Option<Scan>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans
             WHERE root_path = ?1 AND status = 'complete'
             ORDER BY id DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![path_str(root_path)], scan_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Delete a scan; directory, file, and growth rows cascade.
    pub fn delete_scan(&self, scan_id: i64) -> Result<()> {
        self.conn
            .prepare_cached("DELETE FROM scans WHERE id = ?1")?
            .execute(params![scan_id])?;
        Ok(())
    }

    // ──────────────────── scan batch write ────────────────────

    /// Write one scan's directory, file, and growth rows as a single
    /// transaction.
    ///
    /// On any failure the whole batch rolls back and the error names the path
    /// that was being written, leaving the store exactly as before the call.
    /// Duplicate flags are derived inside the same transaction so readers
    /// never observe a half-flagged scan.
    pub fn write_scan_batch(
        &mut self,
        scan_id: i64,
        directories: &[DirectoryRecord],
        files: &[FileRecord],
        growth: &[GrowthSample],
    ) -> Result<()> {
        let tx = self.conn.transaction()?;

        {
            let mut dir_stmt = tx.prepare_cached(
                "INSERT INTO directories (
                    scan_id, path, parent_path, name, size_bytes, file_count,
                    subdir_count, modified_at, scanned_at, fingerprint,
                    category, is_deletable
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            )?;
            for dir in directories {
                dir_stmt
                    .execute(params![
                        scan_id,
                        path_str(&dir.path),
                        dir.parent_path.as_deref().map(path_str),
                        dir.name,
                        to_i64(dir.size_bytes),
                        to_i64(dir.file_count),
                        to_i64(dir.subdir_count),
                        ts_string(&dir.modified_at),
                        ts_string(&dir.scanned_at),
                        dir.fingerprint,
                        dir.category,
                        dir.is_deletable,
                    ])
                    .map_err(|e| batch_error(&dir.path, &e))?;
            }

            let mut file_stmt = tx.prepare_cached(
                "INSERT INTO files (
                    scan_id, path, parent_path, name, extension, size_bytes,
                    modified_at, content_hash, is_large, is_duplicate
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            )?;
            for file in files {
                file_stmt
                    .execute(params![
                        scan_id,
                        path_str(&file.path),
                        path_str(&file.parent_path),
                        file.name,
                        file.extension,
                        to_i64(file.size_bytes),
                        ts_string(&file.modified_at),
                        file.content_hash,
                        file.is_large,
                        file.is_duplicate,
                    ])
                    .map_err(|e| batch_error(&file.path, &e))?;
            }

            let mut growth_stmt = tx.prepare_cached(
                "INSERT INTO growth_samples (scan_id, path, category, size_bytes, sampled_at)
                 VALUES (?1,?2,?3,?4,?5)",
            )?;
            for sample in growth {
                growth_stmt
                    .execute(params![
                        scan_id,
                        path_str(&sample.path),
                        sample.category,
                        to_i64(sample.size_bytes),
                        ts_string(&sample.sampled_at),
                    ])
                    .map_err(|e| batch_error(&sample.path, &e))?;
            }

            // Flag duplicates within this scan in the same transaction.
            tx.execute(
                "UPDATE files SET is_duplicate = 1
                 WHERE scan_id = ?1 AND content_hash IN (
                    SELECT content_hash FROM files
                    WHERE scan_id = ?1 AND content_hash IS NOT NULL
                    GROUP BY content_hash HAVING COUNT(*) > 1
                 )",
                params![scan_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ──────────────────── directory/file queries ────────────────────

    /// All directory records for a scan, ordered by path.
    pub fn directories_for_scan(&self, scan_id: i64) -> Result<Vec<DirectoryRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {DIR_COLUMNS} FROM directories WHERE scan_id = ?1 ORDER BY path ASC"
        ))?;
        let rows = stmt
            .query_map(params![scan_id], dir_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One directory record by (scan, path).
    pub fn directory_at(&self, scan_id: i64, path: &Path) -> Result<Option<DirectoryRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {DIR_COLUMNS} FROM directories WHERE scan_id = ?1 AND path = ?2"
        ))?;
        let mut rows = stmt.query_map(params![scan_id, path_str(path)], dir_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// All file records for a scan, ordered by path.
    pub fn files_for_scan(&self, scan_id: i64) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE scan_id = ?1 ORDER BY path ASC"
        ))?;
        let rows = stmt
            .query_map(params![scan_id], file_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Per-path fingerprints of a scan, for incremental shortcuts and diffs.
    pub fn fingerprints_for_scan(&self, scan_id: i64) -> Result<BTreeMap<PathBuf, String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT path, fingerprint FROM directories WHERE scan_id = ?1")?;
        let rows = stmt.query_map(params![scan_id], |row| {
            Ok((
                PathBuf::from(row.get::<_, String>(0)?),
                row.get::<_, String>(1)?,
            ))
        })?;
        let mut map = BTreeMap::new();
        for row in rows {
            let (path, fp) = row?;
            map.insert(path, fp);
        }
        Ok(map)
    }

    /// Directory and file records at or under `subtree_root` in one scan.
    /// Used by incremental scans to copy unchanged subtrees forward.
    pub fn subtree_records(
        &self,
        scan_id: i64,
        subtree_root: &Path,
    ) -> Result<(Vec<DirectoryRecord>, Vec<FileRecord>)> {
        let exact = path_str(subtree_root);
        let prefix = like_prefix(subtree_root);

        let mut dir_stmt = self.conn.prepare_cached(&format!(
            "SELECT {DIR_COLUMNS} FROM directories
             WHERE scan_id = ?1 AND (path = ?2 OR path LIKE ?3 ESCAPE '\\')
             ORDER BY path ASC"
        ))?;
        let dirs = dir_stmt
            .query_map(params![scan_id, exact, prefix], dir_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut file_stmt = self.conn.prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE scan_id = ?1 AND (path = ?2 OR path LIKE ?3 ESCAPE '\\')
             ORDER BY path ASC"
        ))?;
        let files = file_stmt
            .query_map(params![scan_id, exact, prefix], file_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((dirs, files))
    }

    /// N largest directories of a scan by aggregate size.
    pub fn largest_directories(&self, scan_id: i64, limit: u32) -> Result<Vec<DirectoryRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {DIR_COLUMNS} FROM directories
             WHERE scan_id = ?1 ORDER BY size_bytes DESC, path ASC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![scan_id, limit], dir_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Reclaimable bytes per deletable category for a scan.
    ///
    /// Counts only category roots — directories whose parent is not in the
    /// same category — so a `node_modules` tree is not double-counted through
    /// its own subdirectories.
    pub fn deletable_usage_by_category(&self, scan_id: i64) -> Result<Vec<CategoryUsage>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT d.category, SUM(d.size_bytes), COUNT(*)
             FROM directories d
             LEFT JOIN directories p
               ON p.scan_id = d.scan_id AND p.path = d.parent_path
             WHERE d.scan_id = ?1
               AND d.is_deletable = 1
               AND d.category IS NOT NULL
               AND (p.path IS NULL OR p.category IS NOT d.category)
             GROUP BY d.category
             ORDER BY SUM(d.size_bytes) DESC",
        )?;
        let rows = stmt
            .query_map(params![scan_id], |row| {
                Ok(CategoryUsage {
                    category: row.get(0)?,
                    total_bytes: to_u64(row.get(1)?),
                    directory_count: to_u64(row.get(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Files that share a content hash with at least one other file in the
    /// scan, ordered by hash then path. The analyzer groups them.
    pub fn duplicate_file_records(&self, scan_id: i64) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE scan_id = ?1 AND content_hash IN (
                SELECT content_hash FROM files
                WHERE scan_id = ?1 AND content_hash IS NOT NULL
                GROUP BY content_hash HAVING COUNT(*) > 1
             )
             ORDER BY content_hash ASC, path ASC"
        ))?;
        let rows = stmt
            .query_map(params![scan_id], file_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Growth samples for a path over the last `k` scans, oldest first.
    pub fn growth_series(&self, path: &Path, last_k: u32) -> Result<Vec<GrowthSample>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT scan_id, path, category, size_bytes, sampled_at FROM (
                SELECT scan_id, path, category, size_bytes, sampled_at
                FROM growth_samples WHERE path = ?1
                ORDER BY sampled_at DESC LIMIT ?2
             ) ORDER BY sampled_at ASC",
        )?;
        let rows = stmt
            .query_map(params![path_str(path), last_k], |row| {
                Ok(GrowthSample {
                    scan_id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    category: row.get(2)?,
                    size_bytes: to_u64(row.get(3)?),
                    sampled_at: parse_ts(4, &row.get::<_, String>(4)?)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ──────────────────── categories & exclusions ────────────────────

    /// Insert or replace a category definition.
    pub fn upsert_category(&self, category: &Category) -> Result<()> {
        category.validate()?;
        let patterns = serde_json::to_string(&category.patterns)?;
        self.conn
            .prepare_cached(
                "INSERT OR REPLACE INTO categories
                    (name, description, patterns, deletable, restoration_hint, priority)
                 VALUES (?1,?2,?3,?4,?5,?6)",
            )?
            .execute(params![
                category.name,
                category.description,
                patterns,
                category.deletable,
                category.restoration_hint,
                category.priority,
            ])?;
        Ok(())
    }

    /// All categories, priority descending then name.
    pub fn categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, description, patterns, deletable, restoration_hint, priority
             FROM categories ORDER BY priority DESC, name ASC",
        )?;
        let rows = stmt
            .query_map([], category_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One category by name.
    pub fn category(&self, name: &str) -> Result<Option<Category>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, description, patterns, deletable, restoration_hint, priority
             FROM categories WHERE name = ?1",
        )?;
        let mut rows = stmt.query_map(params![name], category_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Replace the exclusion rule set wholesale.
    pub fn replace_exclusion_rules(&mut self, rules: &[ExclusionRule]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM exclusion_rules", [])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO exclusion_rules (pattern, reason, active) VALUES (?1,?2,?3)",
            )?;
            for rule in rules {
                stmt.execute(params![rule.pattern, rule.reason, rule.active])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All stored exclusion rules.
    pub fn exclusion_rules(&self) -> Result<Vec<ExclusionRule>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT pattern, reason, active FROM exclusion_rules ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExclusionRule {
                    pattern: row.get(0)?,
                    reason: row.get(1)?,
                    active: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ──────────────────── cleanup history ────────────────────

    /// Append one cleanup-history row. Always a standalone atomic insert,
    /// never part of another transaction.
    pub fn append_cleanup_entry(&self, entry: &NewCleanupEntry) -> Result<CleanupHistoryEntry> {
        // Truncate to the stored (millisecond) precision so the returned
        // entry round-trips equal through the TEXT column.
        let timestamp = Utc::now().trunc_subsecs(3);
        self.conn
            .prepare_cached(
                "INSERT INTO cleanup_history (
                    timestamp, path, size_bytes, category, action, success,
                    error, trash_path, restorable
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            )?
            .execute(params![
                ts_string(&timestamp),
                path_str(&entry.path),
                to_i64(entry.size_bytes),
                entry.category,
                entry.action.as_str(),
                entry.success,
                entry.error,
                entry.trash_path.as_deref().map(path_str),
                entry.restorable,
            ])?;
        let id = self.conn.last_insert_rowid();
        Ok(CleanupHistoryEntry {
            id,
            timestamp,
            path: entry.path.clone(),
            size_bytes: entry.size_bytes,
            category: entry.category.clone(),
            action: entry.action,
            success: entry.success,
            error: entry.error.clone(),
            trash_path: entry.trash_path.clone(),
            restorable: entry.restorable,
        })
    }

    /// Recent cleanup history, newest first.
    pub fn cleanup_history(&self, limit: u32) -> Result<Vec<CleanupHistoryEntry>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CLEANUP_COLUMNS} FROM cleanup_history ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], cleanup_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One cleanup-history row by id.
    pub fn cleanup_entry(&self, id: i64) -> Result<Option<CleanupHistoryEntry>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CLEANUP_COLUMNS} FROM cleanup_history WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], cleanup_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }
}

// ──────────────────── row mapping ────────────────────

const SCAN_COLUMNS: &str = "id, root_path, kind, status, started_at, finished_at, duration_ms, \
     file_count, directory_count, total_size_bytes, root_fingerprint, exclusion_snapshot";

const DIR_COLUMNS: &str = "scan_id, path, parent_path, name, size_bytes, file_count, \
     subdir_count, modified_at, scanned_at, fingerprint, category, is_deletable";

const FILE_COLUMNS: &str = "scan_id, path, parent_path, name, extension, size_bytes, \
     modified_at, content_hash, is_large, is_duplicate";

const CLEANUP_COLUMNS: &str =
    "id, timestamp, path, size_bytes, category, action, success, error, trash_path, restorable";

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<Scan> {
    let kind_raw: String = row.get(2)?;
    let status_raw: String = row.get(3)?;
    let snapshot_raw: String = row.get(11)?;
    Ok(Scan {
        id: row.get(0)?,
        root_path: PathBuf::from(row.get::<_, String>(1)?),
        kind: ScanKind::parse(&kind_raw).ok_or_else(|| text_error(2, &kind_raw))?,
        status: ScanStatus::parse(&status_raw).ok_or_else(|| text_error(3, &status_raw))?,
        started_at: parse_ts(4, &row.get::<_, String>(4)?)?,
        finished_at: row
            .get::<_, Option<String>>(5)?
            .map(|raw| parse_ts(5, &raw))
            .transpose()?,
        duration_ms: row.get(6)?,
        file_count: to_u64(row.get(7)?),
        directory_count: to_u64(row.get(8)?),
        total_size_bytes: to_u64(row.get(9)?),
        root_fingerprint: row.get(10)?,
        exclusion_snapshot: serde_json::from_str(&snapshot_raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                11,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?,
    })
}

fn dir_from_row(row: &Row<'_>) -> rusqlite::Result<DirectoryRecord> {
    Ok(DirectoryRecord {
        scan_id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        parent_path: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        name: row.get(3)?,
        size_bytes: to_u64(row.get(4)?),
        file_count: to_u64(row.get(5)?),
        subdir_count: to_u64(row.get(6)?),
        modified_at: parse_ts(7, &row.get::<_, String>(7)?)?,
        scanned_at: parse_ts(8, &row.get::<_, String>(8)?)?,
        fingerprint: row.get(9)?,
        category: row.get(10)?,
        is_deletable: row.get(11)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        scan_id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        parent_path: PathBuf::from(row.get::<_, String>(2)?),
        name: row.get(3)?,
        extension: row.get(4)?,
        size_bytes: to_u64(row.get(5)?),
        modified_at: parse_ts(6, &row.get::<_, String>(6)?)?,
        content_hash: row.get(7)?,
        is_large: row.get(8)?,
        is_duplicate: row.get(9)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let patterns_raw: String = row.get(2)?;
    Ok(Category {
        name: row.get(0)?,
        description: row.get(1)?,
        patterns: serde_json::from_str(&patterns_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        deletable: row.get(3)?,
        restoration_hint: row.get(4)?,
        priority: row.get(5)?,
    })
}

fn cleanup_from_row(row: &Row<'_>) -> rusqlite::Result<CleanupHistoryEntry> {
    let action_raw: String = row.get(5)?;
    Ok(CleanupHistoryEntry {
        id: row.get(0)?,
        timestamp: parse_ts(1, &row.get::<_, String>(1)?)?,
        path: PathBuf::from(row.get::<_, String>(2)?),
        size_bytes: to_u64(row.get(3)?),
        category: row.get(4)?,
        action: CleanupAction::parse(&action_raw).ok_or_else(|| text_error(5, &action_raw))?,
        success: row.get(6)?,
        error: row.get(7)?,
        trash_path: row.get::<_, Option<String>>(8)?.map(PathBuf::from),
        restorable: row.get(9)?,
    })
}

// ──────────────────── helpers ────────────────────

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// SQL LIKE pattern matching strict descendants of `path`, with `%`/`_`
/// occurring in real path names escaped.
fn like_prefix(path: &Path) -> String {
    let escaped = path_str(path)
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}/%")
}

fn ts_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn text_error(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized value {raw:?}").into(),
    )
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn batch_error(path: &Path, error: &rusqlite::Error) -> WardenError {
    WardenError::CatalogWrite {
        path: path.to_path_buf(),
        details: error.to_string(),
    }
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[DW-CATALOG] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_pragmas_memory(conn: &Connection) -> Result<()> {
    // In-memory databases cannot use WAL; keep the rest of the profile.
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA temp_store = MEMORY;",
    )?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS scans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            root_path TEXT NOT NULL,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            duration_ms INTEGER,
            file_count INTEGER NOT NULL DEFAULT 0,
            directory_count INTEGER NOT NULL DEFAULT 0,
            total_size_bytes INTEGER NOT NULL DEFAULT 0,
            root_fingerprint TEXT,
            exclusion_snapshot TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS directories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_id INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            parent_path TEXT,
            name TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            file_count INTEGER NOT NULL,
            subdir_count INTEGER NOT NULL,
            modified_at TEXT NOT NULL,
            scanned_at TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            category TEXT,
            is_deletable INTEGER NOT NULL DEFAULT 0,
            UNIQUE (scan_id, path)
        );

        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_id INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            parent_path TEXT NOT NULL,
            name TEXT NOT NULL,
            extension TEXT,
            size_bytes INTEGER NOT NULL,
            modified_at TEXT NOT NULL,
            content_hash TEXT,
            is_large INTEGER NOT NULL DEFAULT 0,
            is_duplicate INTEGER NOT NULL DEFAULT 0,
            UNIQUE (scan_id, path)
        );

        CREATE TABLE IF NOT EXISTS categories (
            name TEXT PRIMARY KEY,
            description TEXT NOT NULL DEFAULT '',
            patterns TEXT NOT NULL,
            deletable INTEGER NOT NULL,
            restoration_hint TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS exclusion_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL UNIQUE,
            reason TEXT NOT NULL DEFAULT '',
            active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS cleanup_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            path TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            category TEXT,
            action TEXT NOT NULL,
            success INTEGER NOT NULL,
            error TEXT,
            trash_path TEXT,
            restorable INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS growth_samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_id INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            category TEXT,
            size_bytes INTEGER NOT NULL,
            sampled_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scans_root ON scans(root_path, id);
        CREATE INDEX IF NOT EXISTS idx_directories_scan_path ON directories(scan_id, path);
        CREATE INDEX IF NOT EXISTS idx_directories_scan_size ON directories(scan_id, size_bytes);
        CREATE INDEX IF NOT EXISTS idx_directories_scan_category ON directories(scan_id, category);
        CREATE INDEX IF NOT EXISTS idx_files_scan_path ON files(scan_id, path);
        CREATE INDEX IF NOT EXISTS idx_files_scan_hash ON files(scan_id, content_hash);
        CREATE INDEX IF NOT EXISTS idx_growth_path_time ON growth_samples(path, sampled_at);
        CREATE INDEX IF NOT EXISTS idx_cleanup_timestamp ON cleanup_history(timestamp);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DO_NOT_DELETE, default_categories};

    fn mem_store() -> CatalogStore {
        CatalogStore::open_in_memory().unwrap()
    }

    fn dir_record(scan_id: i64, path: &str, parent: Option<&str>, size: u64) -> DirectoryRecord {
        let path = PathBuf::from(path);
        DirectoryRecord {
            scan_id,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            parent_path: parent.map(PathBuf::from),
            path,
            size_bytes: size,
            file_count: 1,
            subdir_count: 0,
            modified_at: Utc::now(),
            scanned_at: Utc::now(),
            fingerprint: format!("fp-{size}"),
            category: None,
            is_deletable: false,
        }
    }

    fn file_record(scan_id: i64, path: &str, size: u64, hash: Option<&str>) -> FileRecord {
        let path = PathBuf::from(path);
        FileRecord {
            scan_id,
            parent_path: path.parent().unwrap().to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned()),
            path,
            size_bytes: size,
            modified_at: Utc::now(),
            content_hash: hash.map(String::from),
            is_large: size >= 1000,
            is_duplicate: false,
        }
    }

    #[test]
    fn file_store_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.sqlite3")).unwrap();
        assert!(store.is_wal_mode());
    }

    #[test]
    fn idempotent_schema_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.sqlite3");
        drop(CatalogStore::open(&path).unwrap());
        let store = CatalogStore::open(&path).unwrap();
        assert!(store.is_wal_mode());
    }

    #[test]
    fn scan_lifecycle_round_trip() {
        let store = mem_store();
        let id = store
            .begin_scan(Path::new("/data"), ScanKind::Full, &["/data/skip".to_string()])
            .unwrap();

        let running = store.scan(id).unwrap().unwrap();
        assert_eq!(running.status, ScanStatus::Running);
        assert_eq!(running.kind, ScanKind::Full);
        assert_eq!(running.exclusion_snapshot, vec!["/data/skip".to_string()]);
        assert!(running.finished_at.is_none());

        store
            .finalize_scan(
                id,
                ScanStatus::Complete,
                &ScanTotals {
                    file_count: 10,
                    directory_count: 3,
                    total_size_bytes: 4096,
                    root_fingerprint: Some("abc".to_string()),
                },
            )
            .unwrap();

        let done = store.scan(id).unwrap().unwrap();
        assert_eq!(done.status, ScanStatus::Complete);
        assert_eq!(done.file_count, 10);
        assert_eq!(done.root_fingerprint.as_deref(), Some("abc"));
        assert!(done.finished_at.is_some());
    }

    #[test]
    fn finalize_missing_scan_errors() {
        let store = mem_store();
        let err = store
            .finalize_scan(999, ScanStatus::Complete, &ScanTotals::default())
            .unwrap_err();
        assert_eq!(err.code(), "DW-2102");
    }

    #[test]
    fn latest_scan_prefers_newest() {
        let store = mem_store();
        let a = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();
        let b = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();
        assert!(b > a);
        assert_eq!(store.latest_scan(Path::new("/data")).unwrap().unwrap().id, b);
        assert!(store.latest_scan(Path::new("/other")).unwrap().is_none());
    }

    #[test]
    fn latest_complete_scan_skips_interrupted() {
        let store = mem_store();
        let a = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();
        store
            .finalize_scan(a, ScanStatus::Complete, &ScanTotals::default())
            .unwrap();
        let b = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();
        store
            .finalize_scan(b, ScanStatus::Interrupted, &ScanTotals::default())
            .unwrap();

        assert_eq!(
            store.latest_complete_scan(Path::new("/data")).unwrap().unwrap().id,
            a
        );
    }

    #[test]
    fn batch_write_and_read_back() {
        let mut store = mem_store();
        let id = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();

        let dirs = vec![
            dir_record(id, "/data", None, 300),
            dir_record(id, "/data/a", Some("/data"), 100),
        ];
        let files = vec![file_record(id, "/data/a/big.bin", 2000, Some("h1"))];
        let growth = vec![GrowthSample {
            scan_id: id,
            path: PathBuf::from("/data/a"),
            category: None,
            size_bytes: 100,
            sampled_at: Utc::now(),
        }];

        store.write_scan_batch(id, &dirs, &files, &growth).unwrap();

        let read_dirs = store.directories_for_scan(id).unwrap();
        assert_eq!(read_dirs.len(), 2);
        assert_eq!(read_dirs[0].path, PathBuf::from("/data"));

        let read_files = store.files_for_scan(id).unwrap();
        assert_eq!(read_files.len(), 1);
        assert!(read_files[0].is_large);

        let series = store.growth_series(Path::new("/data/a"), 10).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn batch_failure_rolls_back_everything() {
        let mut store = mem_store();
        let id = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();

        // Second record violates the (scan_id, path) uniqueness constraint.
        let dirs = vec![
            dir_record(id, "/data", None, 300),
            dir_record(id, "/data", None, 300),
        ];
        let err = store.write_scan_batch(id, &dirs, &[], &[]).unwrap_err();
        assert_eq!(err.code(), "DW-2201");
        assert!(err.to_string().contains("/data"));

        // Nothing from the batch may remain.
        assert!(store.directories_for_scan(id).unwrap().is_empty());
    }

    #[test]
    fn delete_scan_cascades() {
        let mut store = mem_store();
        let id = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();
        let dirs = vec![dir_record(id, "/data", None, 10)];
        let files = vec![file_record(id, "/data/f.bin", 1, None)];
        store.write_scan_batch(id, &dirs, &files, &[]).unwrap();

        store.delete_scan(id).unwrap();
        assert!(store.scan(id).unwrap().is_none());
        assert!(store.directories_for_scan(id).unwrap().is_empty());
        assert!(store.files_for_scan(id).unwrap().is_empty());
    }

    #[test]
    fn duplicates_flagged_within_batch() {
        let mut store = mem_store();
        let id = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();
        let files = vec![
            file_record(id, "/data/a.bin", 100, Some("same")),
            file_record(id, "/data/b.bin", 100, Some("same")),
            file_record(id, "/data/c.bin", 100, Some("unique")),
        ];
        store.write_scan_batch(id, &[], &files, &[]).unwrap();

        let dupes = store.duplicate_file_records(id).unwrap();
        assert_eq!(dupes.len(), 2);
        assert!(dupes.iter().all(|f| f.is_duplicate));
        assert!(dupes.iter().all(|f| f.content_hash.as_deref() == Some("same")));
    }

    #[test]
    fn largest_directories_ordering() {
        let mut store = mem_store();
        let id = store.begin_scan(Path::new("/data"), ScanKind::Full, &[]).unwrap();
        let dirs = vec![
            dir_record(id, "/data/small", Some("/data"), 10),
            dir_record(id, "/data/big", Some("/data"), 1000),
            dir_record(id, "/data/mid", Some("/data"), 100),
        ];
        store.write_scan_batch(id, &dirs, &[], &[]).unwrap();

        let top = store.largest_directories(id, 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].path, PathBuf::from("/data/big"));
        assert_eq!(top[1].path, PathBuf::from("/data/mid"));
    }

    #[test]
    fn deletable_usage_counts_category_roots_only() {
        let mut store = mem_store();
        let id = store.begin_scan(Path::new("/p"), ScanKind::Full, &[]).unwrap();

        let mut root = dir_record(id, "/p/node_modules", Some("/p"), 500);
        root.category = Some("node_modules".to_string());
        root.is_deletable = true;
        let mut nested = dir_record(id, "/p/node_modules/lodash", Some("/p/node_modules"), 200);
        nested.category = Some("node_modules".to_string());
        nested.is_deletable = true;
        let plain = dir_record(id, "/p/src", Some("/p"), 50);

        store.write_scan_batch(id, &[root, nested, plain], &[], &[]).unwrap();

        let usage = store.deletable_usage_by_category(id).unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].category, "node_modules");
        // Only the category root counts; nested rows would double-count.
        assert_eq!(usage[0].total_bytes, 500);
        assert_eq!(usage[0].directory_count, 1);
    }

    #[test]
    fn subtree_records_capture_root_and_descendants() {
        let mut store = mem_store();
        let id = store.begin_scan(Path::new("/d"), ScanKind::Full, &[]).unwrap();
        let dirs = vec![
            dir_record(id, "/d", None, 1),
            dir_record(id, "/d/sub", Some("/d"), 1),
            dir_record(id, "/d/sub/deep", Some("/d/sub"), 1),
            dir_record(id, "/d/subsidiary", Some("/d"), 1),
        ];
        store.write_scan_batch(id, &dirs, &[], &[]).unwrap();

        let (sub_dirs, _) = store.subtree_records(id, Path::new("/d/sub")).unwrap();
        let paths: Vec<_> = sub_dirs.iter().map(|d| d.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/d/sub"), PathBuf::from("/d/sub/deep")],
            "prefix match must not swallow sibling /d/subsidiary"
        );
    }

    #[test]
    fn category_round_trip() {
        let store = mem_store();
        for category in default_categories() {
            store.upsert_category(&category).unwrap();
        }

        let all = store.categories().unwrap();
        assert_eq!(all.len(), default_categories().len());
        // Ordered by priority desc: git_history first.
        assert_eq!(all[0].name, "git_history");
        assert_eq!(all[0].restoration_hint, DO_NOT_DELETE);

        let nm = store.category("node_modules").unwrap().unwrap();
        assert!(nm.deletable);
        assert!(!nm.patterns.is_empty());
        assert!(store.category("missing").unwrap().is_none());
    }

    #[test]
    fn exclusion_rules_round_trip() {
        let mut store = mem_store();
        let rules = vec![
            ExclusionRule {
                pattern: "/data/mirror".to_string(),
                reason: "network mount".to_string(),
                active: true,
            },
            ExclusionRule {
                pattern: "/data/archive".to_string(),
                reason: String::new(),
                active: false,
            },
        ];
        store.replace_exclusion_rules(&rules).unwrap();
        assert_eq!(store.exclusion_rules().unwrap(), rules);

        store.replace_exclusion_rules(&rules[..1]).unwrap();
        assert_eq!(store.exclusion_rules().unwrap().len(), 1);
    }

    #[test]
    fn cleanup_append_is_standalone_and_ordered() {
        let store = mem_store();
        let first = store
            .append_cleanup_entry(&NewCleanupEntry {
                path: PathBuf::from("/p/node_modules"),
                size_bytes: 2048,
                category: Some("node_modules".to_string()),
                action: CleanupAction::Trash,
                success: true,
                error: None,
                trash_path: Some(PathBuf::from("/trash/1/p/node_modules")),
                restorable: true,
            })
            .unwrap();
        let second = store
            .append_cleanup_entry(&NewCleanupEntry {
                path: PathBuf::from("/p/dist"),
                size_bytes: 10,
                category: None,
                action: CleanupAction::Trash,
                success: false,
                error: Some("disk full".to_string()),
                trash_path: None,
                restorable: false,
            })
            .unwrap();
        assert!(second.id > first.id);

        let history = store.cleanup_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id, "newest first");
        assert_eq!(history[1].action, CleanupAction::Trash);
        assert_eq!(store.cleanup_entry(first.id).unwrap().unwrap(), first);
    }

    #[test]
    fn growth_series_windows_to_last_k() {
        let mut store = mem_store();
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(store.begin_scan(Path::new("/d"), ScanKind::Full, &[]).unwrap());
        }
        for (i, id) in ids.iter().enumerate() {
            let sample = GrowthSample {
                scan_id: *id,
                path: PathBuf::from("/d/cache"),
                category: Some("temp_cache".to_string()),
                size_bytes: (i as u64 + 1) * 100,
                sampled_at: Utc::now() + chrono::Duration::seconds(i as i64),
            };
            store.write_scan_batch(*id, &[], &[], &[sample]).unwrap();
        }

        let series = store.growth_series(Path::new("/d/cache"), 2).unwrap();
        assert_eq!(series.len(), 2);
        // Oldest-first within the window of the two newest samples.
        assert_eq!(series[0].size_bytes, 300);
        assert_eq!(series[1].size_bytes, 400);
    }
}
