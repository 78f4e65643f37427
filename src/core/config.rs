//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WardenError};

/// Full diskwarden configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub scanner: ScannerConfig,
    pub catalog: CatalogConfig,
    pub safety: SafetyConfig,
}

/// Scanner behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Concurrent walk workers.
    pub workers: usize,
    /// Maximum traversal depth below the scan root.
    pub max_depth: usize,
    pub follow_symlinks: bool,
    /// Aggregate size above which a directory triggers a (non-fatal) warning.
    pub large_directory_warn_bytes: u64,
    /// Files at or above this size are flagged `is_large` and recorded.
    pub large_file_bytes: u64,
    /// Files at or above this size get a full content hash for duplicate
    /// detection. Hashing everything would dominate scan time.
    pub content_hash_min_bytes: u64,
    /// Emit a progress event every N files processed.
    pub progress_interval_files: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_depth: 64,
            follow_symlinks: false,
            large_directory_warn_bytes: 10 * 1024 * 1024 * 1024,
            large_file_bytes: 100 * 1024 * 1024,
            content_hash_min_bytes: 4 * 1024 * 1024,
            progress_interval_files: 1000,
        }
    }
}

/// Catalog store location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogConfig {
    pub database_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: data_dir().join("catalog.sqlite3"),
        }
    }
}

/// Cleanup safety knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SafetyConfig {
    /// Dry-run is the default; real deletion is an explicit opt-out.
    pub dry_run: bool,
    /// Root directory for the recoverable trash.
    pub trash_root: PathBuf,
    /// Extra protected-path glob patterns on top of the built-in table.
    pub protected_patterns: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            trash_root: data_dir().join("trash"),
            protected_patterns: Vec::new(),
        }
    }
}

fn data_dir() -> PathBuf {
    let home = env::var("HOME").map_or_else(|_| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".local").join("share").join("diskwarden")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home = env::var("HOME").map_or_else(|_| PathBuf::from("/tmp"), PathBuf::from);
        home.join(".config").join("diskwarden").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// A missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| WardenError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(WardenError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        set_env_usize("DISKWARDEN_SCANNER_WORKERS", &mut self.scanner.workers)?;
        set_env_usize("DISKWARDEN_SCANNER_MAX_DEPTH", &mut self.scanner.max_depth)?;
        set_env_bool(
            "DISKWARDEN_SCANNER_FOLLOW_SYMLINKS",
            &mut self.scanner.follow_symlinks,
        )?;
        set_env_u64(
            "DISKWARDEN_SCANNER_LARGE_DIRECTORY_WARN_BYTES",
            &mut self.scanner.large_directory_warn_bytes,
        )?;
        set_env_u64(
            "DISKWARDEN_SCANNER_LARGE_FILE_BYTES",
            &mut self.scanner.large_file_bytes,
        )?;
        set_env_u64(
            "DISKWARDEN_SCANNER_CONTENT_HASH_MIN_BYTES",
            &mut self.scanner.content_hash_min_bytes,
        )?;
        set_env_u64(
            "DISKWARDEN_SCANNER_PROGRESS_INTERVAL_FILES",
            &mut self.scanner.progress_interval_files,
        )?;

        if let Some(raw) = env_var("DISKWARDEN_CATALOG_DATABASE_PATH") {
            self.catalog.database_path = PathBuf::from(raw);
        }

        set_env_bool("DISKWARDEN_SAFETY_DRY_RUN", &mut self.safety.dry_run)?;
        if let Some(raw) = env_var("DISKWARDEN_SAFETY_TRASH_ROOT") {
            self.safety.trash_root = PathBuf::from(raw);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.scanner.workers == 0 {
            return Err(WardenError::InvalidConfig {
                details: "scanner.workers must be >= 1".to_string(),
            });
        }
        if self.scanner.max_depth == 0 {
            return Err(WardenError::InvalidConfig {
                details: "scanner.max_depth must be >= 1".to_string(),
            });
        }
        if self.scanner.progress_interval_files == 0 {
            return Err(WardenError::InvalidConfig {
                details: "scanner.progress_interval_files must be >= 1".to_string(),
            });
        }
        if self.scanner.large_directory_warn_bytes == 0 {
            return Err(WardenError::InvalidConfig {
                details: "scanner.large_directory_warn_bytes must be > 0".to_string(),
            });
        }
        if self.scanner.content_hash_min_bytes > self.scanner.large_file_bytes {
            // A large file must always be hash-eligible, otherwise duplicate
            // detection silently skips the biggest wins.
            return Err(WardenError::InvalidConfig {
                details: format!(
                    "scanner.content_hash_min_bytes ({}) must be <= scanner.large_file_bytes ({})",
                    self.scanner.content_hash_min_bytes, self.scanner.large_file_bytes,
                ),
            });
        }

        for pattern in &self.safety.protected_patterns {
            crate::classify::validate_glob_pattern(pattern)?;
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_usize(name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<usize>()
            .map_err(|error| WardenError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw
            .parse::<u64>()
            .map_err(|error| WardenError::ConfigParse {
                context: "env",
                details: format!("{name}={raw:?}: {error}"),
            })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                return Err(WardenError::ConfigParse {
                    context: "env",
                    details: format!("{name}={other:?}: expected a boolean"),
                });
            }
        };
    }
    Ok(())
}
