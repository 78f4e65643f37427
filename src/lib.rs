#![forbid(unsafe_code)]

//! diskwarden — local disk-space custodian for a single workstation.
//!
//! Four cooperating layers:
//! 1. **Catalog** — SQLite store of scans, directory/file records,
//!    categories, exclusions, cleanup history, and growth samples
//! 2. **Scanner** — parallel post-order walk with Merkle-style fingerprints
//!    and an incremental shortcut that reuses unchanged subtrees
//! 3. **Analyzer** — scan diffs, duplicate groups, growth rates, and
//!    cleanup recommendations
//! 4. **Safety** — five-layer deletion gate feeding a trash-only,
//!    always-audited cleanup executor
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use diskwarden::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use diskwarden::catalog::CatalogStore;
//! use diskwarden::scanner::{ScanRequest, Scanner};
//! ```

pub mod prelude;

pub mod analyzer;
pub mod catalog;
pub mod classify;
pub mod core;
pub mod journal;
pub mod safety;
pub mod scanner;
