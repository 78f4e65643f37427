//! End-to-end pipeline tests: scan a real temp tree into a catalog, then
//! analyze it the way a CLI front end would.

use std::fs;
use std::path::{Path, PathBuf};

use diskwarden::analyzer::Analyzer;
use diskwarden::catalog::records::{ScanKind, ScanStatus};
use diskwarden::catalog::store::CatalogStore;
use diskwarden::classify::{CategorySet, ExclusionRule, ExclusionSet, default_categories};
use diskwarden::core::config::ScannerConfig;
use diskwarden::core::paths::resolve_absolute_path;
use diskwarden::scanner::{ScanRequest, Scanner};
use tempfile::TempDir;

fn test_config() -> ScannerConfig {
    ScannerConfig {
        workers: 4,
        large_file_bytes: 4096,
        content_hash_min_bytes: 256,
        ..ScannerConfig::default()
    }
}

fn catalog_with_categories() -> CatalogStore {
    let catalog = CatalogStore::open_in_memory().unwrap();
    for category in default_categories() {
        catalog.upsert_category(&category).unwrap();
    }
    catalog
}

fn run_scan(
    catalog: &mut CatalogStore,
    root: &Path,
    exclusions: &ExclusionSet,
    previous: Option<i64>,
) -> diskwarden::catalog::records::Scan {
    let config = test_config();
    let categories = CategorySet::builtin();
    let scanner = Scanner::new(&config, &categories);
    let request = ScanRequest {
        root,
        exclusions,
        previous_scan: previous,
        workers: None,
        cancel: None,
        sink: None,
    };
    scanner.scan(catalog, &request).unwrap()
}

/// The headline scenario: a project with a reclaimable node_modules and a
/// protected .git must classify both correctly, and recommendations must
/// list node_modules but never git_history.
#[test]
fn node_modules_recommended_git_history_never() {
    let tmp = TempDir::new().unwrap();
    let project = tmp.path().join("project");
    fs::create_dir_all(project.join("node_modules/lodash")).unwrap();
    fs::create_dir_all(project.join(".git/objects")).unwrap();
    fs::write(project.join("node_modules/lodash/index.js"), vec![1u8; 2000]).unwrap();
    fs::write(project.join(".git/objects/pack"), vec![2u8; 500]).unwrap();

    let mut catalog = catalog_with_categories();
    let scan = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), None);
    assert_eq!(scan.status, ScanStatus::Complete);

    let root = resolve_absolute_path(tmp.path());
    let nm = catalog
        .directory_at(scan.id, &root.join("project/node_modules"))
        .unwrap()
        .unwrap();
    assert_eq!(nm.category.as_deref(), Some("node_modules"));
    assert!(nm.is_deletable);

    let git = catalog
        .directory_at(scan.id, &root.join("project/.git"))
        .unwrap()
        .unwrap();
    assert_eq!(git.category.as_deref(), Some("git_history"));
    assert!(!git.is_deletable);

    let recommendations = Analyzer::new(&catalog).recommend(scan.id).unwrap();
    assert!(
        recommendations.iter().any(|r| r.category == "node_modules"),
        "node_modules must be recommended: {recommendations:?}"
    );
    assert!(
        recommendations.iter().all(|r| r.category != "git_history"),
        "git_history must never be recommended"
    );
}

#[test]
fn incremental_scan_reuses_unchanged_records_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let stable = tmp.path().join("stable");
    let churn = tmp.path().join("churn");
    for sub in 0..5 {
        let dir = stable.join(format!("sub{sub}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..20 {
            fs::write(dir.join(format!("f{f}.bin")), vec![sub; 64]).unwrap();
        }
    }
    fs::create_dir_all(&churn).unwrap();
    fs::write(churn.join("scratch.bin"), vec![9u8; 64]).unwrap();

    let mut catalog = catalog_with_categories();
    let first = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), None);
    assert_eq!(first.kind, ScanKind::Full);
    assert_eq!(first.file_count, 101);

    // Touch churn only.
    fs::write(churn.join("new.bin"), vec![8u8; 64]).unwrap();

    let second = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), Some(first.id));
    assert_eq!(second.kind, ScanKind::Incremental);
    assert_eq!(second.file_count, 102);

    // Every record under stable/ was carried forward bit-for-bit.
    let root = resolve_absolute_path(tmp.path());
    let first_dirs = catalog.directories_for_scan(first.id).unwrap();
    let second_dirs = catalog.directories_for_scan(second.id).unwrap();
    for dir in first_dirs.iter().filter(|d| d.path.starts_with(root.join("stable"))) {
        let copied = second_dirs
            .iter()
            .find(|d| d.path == dir.path)
            .expect("stable record must exist in the incremental scan");
        assert_eq!(copied.fingerprint, dir.fingerprint);
        assert_eq!(copied.size_bytes, dir.size_bytes);
        assert_eq!(copied.scanned_at, dir.scanned_at, "reused, not re-scanned");
    }

    // The changed directory was genuinely re-scanned.
    let churn_first = catalog
        .directory_at(first.id, &root.join("churn"))
        .unwrap()
        .unwrap();
    let churn_second = catalog
        .directory_at(second.id, &root.join("churn"))
        .unwrap()
        .unwrap();
    assert_ne!(churn_first.fingerprint, churn_second.fingerprint);
}

#[test]
fn compare_reports_structural_changes_between_scans() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("kept")).unwrap();
    fs::create_dir_all(tmp.path().join("doomed")).unwrap();
    fs::write(tmp.path().join("kept/base.bin"), vec![1u8; 100]).unwrap();

    let mut catalog = catalog_with_categories();
    let first = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), None);

    fs::remove_dir_all(tmp.path().join("doomed")).unwrap();
    fs::create_dir_all(tmp.path().join("fresh")).unwrap();
    fs::write(tmp.path().join("kept/base.bin"), vec![1u8; 900]).unwrap();

    let second = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), None);
    let report = Analyzer::new(&catalog).compare(first.id, second.id).unwrap();

    let root = resolve_absolute_path(tmp.path());
    assert_eq!(report.added, vec![root.join("fresh")]);
    assert_eq!(report.removed, vec![root.join("doomed")]);

    let changed: Vec<PathBuf> = report.changed.iter().map(|c| c.path.clone()).collect();
    assert!(changed.contains(&root.join("kept")), "resized dir reported");
    assert!(changed.contains(&root), "ancestor fingerprints cascade");

    let kept = report
        .changed
        .iter()
        .find(|c| c.path == root.join("kept"))
        .unwrap();
    assert_eq!((kept.size_before, kept.size_after), (100, 900));
}

#[test]
fn duplicate_files_grouped_across_directories() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("a")).unwrap();
    fs::create_dir_all(tmp.path().join("b")).unwrap();
    let payload = vec![0xAAu8; 1024];
    fs::write(tmp.path().join("a/copy1.iso"), &payload).unwrap();
    fs::write(tmp.path().join("b/copy2.iso"), &payload).unwrap();
    fs::write(tmp.path().join("b/other.iso"), vec![0xBBu8; 1024]).unwrap();

    let mut catalog = catalog_with_categories();
    let scan = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), None);

    let groups = Analyzer::new(&catalog).find_duplicates(scan.id).unwrap();
    assert_eq!(groups.len(), 1, "identical payloads form exactly one group");
    let group = &groups[0];
    assert_eq!(group.files.len(), 2);
    assert_eq!(group.total_bytes, 2048);
    // Keep-largest convention; equal sizes degrade to all-but-one.
    assert_eq!(group.wasted_bytes, 1024);
    assert!(group.files.iter().all(|f| f.is_duplicate));
}

#[test]
fn exclusions_keep_subtrees_out_of_the_catalog() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("scanned")).unwrap();
    fs::create_dir_all(tmp.path().join("mirror/deep")).unwrap();
    fs::write(tmp.path().join("mirror/deep/big.bin"), vec![1u8; 4096]).unwrap();
    fs::write(tmp.path().join("scanned/ok.bin"), vec![1u8; 64]).unwrap();

    let root = resolve_absolute_path(tmp.path());
    let exclusions = ExclusionSet::build(&[ExclusionRule {
        pattern: root.join("mirror").to_string_lossy().into_owned(),
        reason: "network mirror".to_string(),
        active: true,
    }]);

    let mut catalog = catalog_with_categories();
    let scan = run_scan(&mut catalog, tmp.path(), &exclusions, None);

    assert_eq!(scan.total_size_bytes, 64);
    let dirs = catalog.directories_for_scan(scan.id).unwrap();
    assert!(dirs.iter().all(|d| !d.path.starts_with(root.join("mirror"))));
    assert_eq!(scan.exclusion_snapshot.len(), 1);
}

#[test]
fn growth_series_accumulates_across_scans() {
    let tmp = TempDir::new().unwrap();
    let cache = tmp.path().join("project/.cache");
    fs::create_dir_all(&cache).unwrap();
    fs::write(cache.join("blob0.bin"), vec![0u8; 100]).unwrap();

    let mut catalog = catalog_with_categories();
    let first = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), None);
    let _ = first;

    fs::write(cache.join("blob1.bin"), vec![0u8; 400]).unwrap();
    let _second = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), None);

    let root = resolve_absolute_path(tmp.path());
    let series = catalog
        .growth_series(&root.join("project/.cache"), 10)
        .unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].size_bytes, 100);
    assert_eq!(series[1].size_bytes, 500);
    assert_eq!(series[0].category.as_deref(), Some("temp_cache"));
}

#[test]
fn largest_directories_query_matches_walk() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("big")).unwrap();
    fs::create_dir_all(tmp.path().join("small")).unwrap();
    fs::write(tmp.path().join("big/blob.bin"), vec![0u8; 3000]).unwrap();
    fs::write(tmp.path().join("small/blob.bin"), vec![0u8; 30]).unwrap();

    let mut catalog = catalog_with_categories();
    let scan = run_scan(&mut catalog, tmp.path(), &ExclusionSet::default(), None);

    let top = catalog.largest_directories(scan.id, 2).unwrap();
    let root = resolve_absolute_path(tmp.path());
    assert_eq!(top[0].path, root, "root aggregates everything");
    assert_eq!(top[1].path, root.join("big"));
}
