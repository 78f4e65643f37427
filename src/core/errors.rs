//! DW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, WardenError>;

/// Top-level error type for diskwarden.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("[DW-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DW-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DW-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DW-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DW-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[DW-2201] catalog batch write failed at {path}: {details}")]
    CatalogWrite { path: PathBuf, details: String },

    #[error("[DW-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[DW-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DW-3003] disk full while writing {path}")]
    DiskFull { path: PathBuf },

    #[error("[DW-3004] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DW-3900] runtime failure: {details}")]
    Runtime { details: String },

    #[error("[DW-4001] cleanup already in flight for {path}")]
    CleanupConflict { path: PathBuf },

    #[error("[DW-4002] rollback blocked for {path}: {details}")]
    RollbackBlocked { path: PathBuf, details: String },
}

impl WardenError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DW-1001",
            Self::MissingConfig { .. } => "DW-1002",
            Self::ConfigParse { .. } => "DW-1003",
            Self::Serialization { .. } => "DW-2101",
            Self::Sql { .. } => "DW-2102",
            Self::CatalogWrite { .. } => "DW-2201",
            Self::PermissionDenied { .. } => "DW-3001",
            Self::Io { .. } => "DW-3002",
            Self::DiskFull { .. } => "DW-3003",
            Self::ChannelClosed { .. } => "DW-3004",
            Self::Runtime { .. } => "DW-3900",
            Self::CleanupConflict { .. } => "DW-4001",
            Self::RollbackBlocked { .. } => "DW-4002",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Disk-full and catalog batch failures are deliberately non-retryable:
    /// the caller decides whether to retry after freeing space or fixing the
    /// store, never this library.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Sql { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    ///
    /// Maps `StorageFull` and `PermissionDenied` io kinds onto their
    /// dedicated variants so callers can match on codes.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            std::io::ErrorKind::StorageFull => Self::DiskFull { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

impl From<rusqlite::Error> for WardenError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
