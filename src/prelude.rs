//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use diskwarden::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, WardenError};

// Classification
pub use crate::classify::{Category, CategorySet, ExclusionRule, ExclusionSet};

// Catalog
pub use crate::catalog::records::{
    CleanupAction, CleanupHistoryEntry, DirectoryRecord, FileRecord, Scan, ScanKind, ScanStatus,
};
pub use crate::catalog::store::CatalogStore;

// Scanner
pub use crate::scanner::progress::{ChannelSink, ProgressSink, ScanEvent};
pub use crate::scanner::{ScanRequest, Scanner};

// Analyzer
pub use crate::analyzer::{Analyzer, ChangeReport, DuplicateGroup};

// Safety
pub use crate::safety::cleanup::CleanupExecutor;
pub use crate::safety::protected::ProtectedPathRegistry;
pub use crate::safety::trash::{FilesystemTrash, TrashBin};
pub use crate::safety::validator::{SafetyValidator, ValidationOutcome, ValidationRequest};

// Journal
pub use crate::journal::EventJournal;
