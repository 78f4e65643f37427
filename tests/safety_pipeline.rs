//! Full deletion-safety pipeline: scan → recommend → validate → execute →
//! rollback, with the audit invariants checked at each step.

use std::fs;

use diskwarden::catalog::records::CleanupAction;
use diskwarden::catalog::store::CatalogStore;
use diskwarden::classify::{CategorySet, ExclusionSet, default_categories};
use diskwarden::core::config::ScannerConfig;
use diskwarden::core::paths::resolve_absolute_path;
use diskwarden::safety::cleanup::CleanupExecutor;
use diskwarden::safety::protected::ProtectedPathRegistry;
use diskwarden::safety::trash::FilesystemTrash;
use diskwarden::safety::validator::{
    SafetyLayer, SafetyValidator, ValidationOutcome, ValidationRequest,
};
use diskwarden::scanner::{ScanRequest, Scanner};
use std::path::Path;
use tempfile::TempDir;

struct Pipeline {
    _tmp: TempDir,
    catalog: CatalogStore,
    categories: CategorySet,
    protected: ProtectedPathRegistry,
    trash: FilesystemTrash,
    target: std::path::PathBuf,
}

fn pipeline() -> Pipeline {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("project/node_modules");
    fs::create_dir_all(target.join("left-pad")).unwrap();
    fs::write(target.join("left-pad/index.js"), vec![1u8; 4000]).unwrap();

    let catalog = CatalogStore::open_in_memory().unwrap();
    for category in default_categories() {
        catalog.upsert_category(&category).unwrap();
    }
    let trash = FilesystemTrash::open(&tmp.path().join("trash")).unwrap();

    Pipeline {
        target,
        catalog,
        categories: CategorySet::builtin(),
        protected: ProtectedPathRegistry::builtin(),
        trash,
        _tmp: tmp,
    }
}

#[test]
fn scan_then_validate_then_execute_then_rollback() {
    let mut pipe = pipeline();

    // Scan the tree so the candidate is catalog-derived, not invented.
    let config = ScannerConfig {
        workers: 2,
        ..ScannerConfig::default()
    };
    let scanner = Scanner::new(&config, &pipe.categories);
    let exclusions = ExclusionSet::default();
    let root = pipe.target.parent().unwrap().parent().unwrap().to_path_buf();
    let scan = scanner
        .scan(&mut pipe.catalog, &ScanRequest::full(&root, &exclusions))
        .unwrap();

    let resolved_target = resolve_absolute_path(&pipe.target);
    let record = pipe
        .catalog
        .directory_at(scan.id, &resolved_target)
        .unwrap()
        .expect("scan must have recorded the candidate");
    assert!(record.is_deletable);

    let validator = SafetyValidator::new(&pipe.protected, &pipe.categories, &pipe.catalog);

    // Dry-run is the default posture: a preview request never approves.
    let preview = validator.validate(&ValidationRequest::preview(&record.path));
    assert_eq!(
        preview.rejection().map(|r| r.layer),
        Some(SafetyLayer::DryRun)
    );

    // Explicit opt-out plus explicit confirmation approves.
    let armed = ValidationRequest {
        path: &record.path,
        dry_run: false,
        confirmation: Some("yes, trash node_modules"),
    };
    let ValidationOutcome::Approved(candidate) = validator.validate(&armed) else {
        panic!("expected approval");
    };

    let executor = CleanupExecutor::new(&pipe.catalog, &pipe.trash);
    let entry = executor.execute(&candidate).unwrap();
    assert!(entry.success);
    assert_eq!(entry.action, CleanupAction::Trash);
    assert_eq!(entry.size_bytes, 4000);
    assert!(!pipe.target.exists());

    // Exactly one audit row so far.
    assert_eq!(pipe.catalog.cleanup_history(10).unwrap().len(), 1);

    // Rollback restores the tree and appends (never rewrites) the audit.
    let rollback = executor.rollback(&entry).unwrap();
    assert!(rollback.success);
    assert!(pipe.target.join("left-pad/index.js").exists());

    let history = pipe.catalog.cleanup_history(10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, CleanupAction::Rollback);
    assert_eq!(history[1], entry, "original entry immutable");
}

#[test]
fn system_path_rejected_at_layer_one_despite_deletable_category() {
    let pipe = pipeline();

    // An administrator defines a category that would claim /System paths as
    // deletable. Layer 1 must still win.
    let rogue = diskwarden::classify::Category {
        name: "rogue_system".to_string(),
        description: "misconfigured".to_string(),
        patterns: vec!["/System/**".to_string()],
        deletable: true,
        restoration_hint: "reinstall macOS".to_string(),
        priority: 10_000,
    };
    pipe.catalog.upsert_category(&rogue).unwrap();
    let mut definitions = default_categories();
    definitions.push(rogue);
    let categories = CategorySet::build(definitions).unwrap();

    let validator = SafetyValidator::new(&pipe.protected, &categories, &pipe.catalog);
    let outcome = validator.validate(&ValidationRequest {
        path: Path::new("/System/Library/Foo"),
        dry_run: false,
        confirmation: Some("I am sure"),
    });

    let rejection = outcome.rejection().expect("must reject");
    assert_eq!(rejection.layer, SafetyLayer::ProtectedPath);
    assert_eq!(rejection.layer.number(), 1);
}

#[test]
fn every_layer_is_independently_required() {
    let pipe = pipeline();
    let validator = SafetyValidator::new(&pipe.protected, &pipe.categories, &pipe.catalog);

    let armed = ValidationRequest {
        path: &pipe.target,
        dry_run: false,
        confirmation: Some("go"),
    };
    assert!(validator.validate(&armed).is_approved());

    let uncategorized = pipe._tmp.path().join("project");
    let cases: Vec<(ValidationRequest<'_>, SafetyLayer)> = vec![
        (
            ValidationRequest {
                path: Path::new("/usr/bin"),
                ..armed
            },
            SafetyLayer::ProtectedPath,
        ),
        (
            ValidationRequest {
                path: &uncategorized,
                ..armed
            },
            SafetyLayer::Category,
        ),
        (
            ValidationRequest {
                dry_run: true,
                ..armed
            },
            SafetyLayer::DryRun,
        ),
        (
            ValidationRequest {
                confirmation: None,
                ..armed
            },
            SafetyLayer::Confirmation,
        ),
    ];

    for (request, expected_layer) in cases {
        let outcome = validator.validate(&request);
        assert_eq!(
            outcome.rejection().map(|r| r.layer),
            Some(expected_layer),
            "flipping one layer must reject at that layer"
        );
    }
}

#[test]
fn vanished_target_failure_still_audited() {
    let pipe = pipeline();
    let validator = SafetyValidator::new(&pipe.protected, &pipe.categories, &pipe.catalog);
    let ValidationOutcome::Approved(candidate) = validator.validate(&ValidationRequest {
        path: &pipe.target,
        dry_run: false,
        confirmation: Some("go"),
    }) else {
        panic!("expected approval");
    };

    // The target vanishes between approval and execution.
    fs::remove_dir_all(&pipe.target).unwrap();

    let executor = CleanupExecutor::new(&pipe.catalog, &pipe.trash);
    let entry = executor.execute(&candidate).unwrap();
    assert!(!entry.success);
    assert!(entry.error.is_some());
    assert!(!entry.restorable);
    assert_eq!(pipe.catalog.cleanup_history(10).unwrap().len(), 1);
}
