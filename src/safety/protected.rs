//! Layer 1: protected paths that can never be deleted.
//!
//! The built-in table covers system directories, user data, credentials, and
//! development-critical paths. It cannot be overridden by category rules or
//! caller flags; configuration can only add patterns, never remove them.

#![allow(missing_docs)]

use std::path::Path;

use regex::Regex;

use crate::classify::glob_to_regex;
use crate::core::errors::Result;
use crate::core::paths::resolve_absolute_path;

/// Built-in protected patterns. `~` expands against `$HOME` at compile time.
pub fn default_protected_patterns() -> Vec<&'static str> {
    vec![
        // System directories
        "/System/**",
        "/bin/**",
        "/sbin/**",
        "/usr/bin/**",
        "/usr/sbin/**",
        "/usr/lib/**",
        "/private/var/vm/**",
        "/etc/**",
        "/Library/**",
        // User data
        "~/Documents/**",
        "~/Desktop/**",
        "~/Downloads/**",
        "~/Pictures/**",
        "~/Movies/**",
        "~/Music/**",
        // Credentials and user configuration
        "~/.ssh/**",
        "~/.gnupg/**",
        "~/.aws/**",
        "~/.config/**",
        // Development critical
        "**/.git",
        "**/.git/**",
        "**/.github",
        "**/.github/**",
        "**/LICENSE",
        "**/README.md",
        // Installed applications
        "/Applications/**",
        "~/Library/Application Support/**",
        // Databases and backups
        "**/database/**",
        "**/backup/**",
        "**/backups/**",
    ]
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    original: String,
    /// Matches the pattern itself.
    matcher: Regex,
    /// Matches the pattern's base for `X/**` forms, so `/System` is as
    /// protected as `/System/Library`.
    base: Option<Regex>,
}

/// The compiled protected-path table.
#[derive(Debug, Clone)]
pub struct ProtectedPathRegistry {
    patterns: Vec<CompiledPattern>,
}

impl ProtectedPathRegistry {
    /// Built-in table only.
    pub fn builtin() -> Self {
        // The static table is known-valid; compile cannot fail.
        Self::compile(default_protected_patterns().iter().map(|p| (*p).to_string()))
            .expect("builtin protected patterns are valid")
    }

    /// Built-in table plus configured extras. Extras can only widen the net.
    pub fn with_extra_patterns(extra: &[String]) -> Result<Self> {
        let all = default_protected_patterns()
            .into_iter()
            .map(|p| p.to_string())
            .chain(extra.iter().cloned());
        Self::compile(all)
    }

    fn compile(patterns: impl Iterator<Item = String>) -> Result<Self> {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let matcher = glob_to_regex(&pattern)?;
            let base = pattern
                .strip_suffix("/**")
                .map(glob_to_regex)
                .transpose()?;
            compiled.push(CompiledPattern {
                original: pattern,
                matcher,
                base,
            });
        }
        Ok(Self { patterns: compiled })
    }

    /// Whether any pattern protects this path.
    ///
    /// The path is normalized first; matching is string-based against the
    /// path and is fail-closed by construction (no I/O, no error branch that
    /// could leak a protected path through).
    pub fn is_protected(&self, path: &Path) -> bool {
        self.matching_pattern(path).is_some()
    }

    /// The first pattern protecting this path, for rejection messages.
    pub fn matching_pattern(&self, path: &Path) -> Option<&str> {
        let normalized = resolve_absolute_path(path);
        let haystack = normalized.to_string_lossy().replace('\\', "/");
        self.patterns
            .iter()
            .find(|p| {
                p.matcher.is_match(&haystack)
                    || p.base.as_ref().is_some_and(|b| b.is_match(&haystack))
            })
            .map(|p| p.original.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
