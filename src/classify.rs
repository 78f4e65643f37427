//! Category and exclusion pattern engine.
//!
//! Categories map a normalized absolute path to a named classification rule
//! that decides whether the path is reclaimable and how to restore it.
//! Exclusions are checked by the scanner before classification and stop
//! traversal outright.
//!
//! Matching is glob-based: `**` crosses path separators, `*` stays within a
//! component, `?` matches a single non-separator character. Classification is
//! total: a pattern that fails to compile is dropped when the set is built,
//! never surfaced as a match-time error.

#![allow(missing_docs)]

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WardenError};

/// Restoration hint sentinel carried by every non-deletable category.
pub const DO_NOT_DELETE: &str = "do not delete";

/// Restoration hint for deletable content that simply regenerates itself.
pub const NO_RESTORATION_NEEDED: &str = "N/A";

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A named classification rule, externally loaded or built-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub description: String,
    /// Ordered glob patterns; the category matches if any pattern matches.
    pub patterns: Vec<String>,
    pub deletable: bool,
    /// How to regenerate the content after deletion, or [`DO_NOT_DELETE`].
    pub restoration_hint: String,
    /// Higher priority wins ties and sorts recommendations first.
    pub priority: i64,
}

impl Category {
    /// Check the restoration-hint invariant.
    ///
    /// A non-deletable category must carry the [`DO_NOT_DELETE`] sentinel;
    /// a deletable one must document restoration (or state [`NO_RESTORATION_NEEDED`]).
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WardenError::InvalidConfig {
                details: "category name must not be empty".to_string(),
            });
        }
        if self.deletable {
            if self.restoration_hint.trim().is_empty() {
                return Err(WardenError::InvalidConfig {
                    details: format!(
                        "deletable category {:?} must carry a restoration hint or {NO_RESTORATION_NEEDED:?}",
                        self.name
                    ),
                });
            }
        } else if self.restoration_hint != DO_NOT_DELETE {
            return Err(WardenError::InvalidConfig {
                details: format!(
                    "non-deletable category {:?} must use the {DO_NOT_DELETE:?} sentinel",
                    self.name
                ),
            });
        }
        Ok(())
    }
}

/// A traversal exclusion: the scanner never descends into matching paths and
/// records nothing for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub pattern: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Compiled sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CompiledCategory {
    category: Category,
    patterns: Vec<Regex>,
}

/// Immutable, process-scoped category snapshot.
///
/// Built once from an ordered definition list and shared read-only with every
/// scanner worker. Evaluation order is priority descending, then name
/// ascending, so first-match-wins is deterministic regardless of input order.
#[derive(Debug, Clone)]
pub struct CategorySet {
    compiled: Vec<CompiledCategory>,
    dropped_patterns: usize,
}

impl CategorySet {
    /// Compile a category list. Malformed patterns are dropped (counted via
    /// [`Self::dropped_pattern_count`]), not errors; invalid restoration-hint
    /// invariants are.
    pub fn build(categories: Vec<Category>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(categories.len());
        let mut dropped = 0usize;

        for category in categories {
            category.validate()?;
            let mut regexes = Vec::with_capacity(category.patterns.len());
            for pattern in &category.patterns {
                match glob_to_regex(pattern) {
                    Ok(re) => regexes.push(re),
                    Err(_) => dropped += 1,
                }
            }
            compiled.push(CompiledCategory {
                category,
                patterns: regexes,
            });
        }

        compiled.sort_by(|a, b| {
            b.category
                .priority
                .cmp(&a.category.priority)
                .then_with(|| a.category.name.cmp(&b.category.name))
        });

        Ok(Self {
            compiled,
            dropped_patterns: dropped,
        })
    }

    /// Build the default category table.
    pub fn builtin() -> Self {
        // Built-in patterns are static and known-valid; build cannot fail.
        Self::build(default_categories()).expect("builtin categories are valid")
    }

    /// Classify a normalized absolute path.
    ///
    /// First category (in priority-then-name order) whose pattern set matches
    /// wins. Returns `None` for uncategorized paths. Pure and total.
    pub fn classify(&self, path: &Path) -> Option<&Category> {
        let haystack = normalize_for_matching(path);
        self.compiled
            .iter()
            .find(|c| c.patterns.iter().any(|re| re.is_match(&haystack)))
            .map(|c| &c.category)
    }

    /// Look up a category by name.
    pub fn get(&self, name: &str) -> Option<&Category> {
        self.compiled
            .iter()
            .map(|c| &c.category)
            .find(|c| c.name == name)
    }

    /// Iterate categories in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.compiled.iter().map(|c| &c.category)
    }

    /// Number of patterns that failed to compile and were dropped.
    pub fn dropped_pattern_count(&self) -> usize {
        self.dropped_patterns
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Compiled active exclusion rules.
///
/// A path is excluded if it, or any of its ancestors, matches an active
/// pattern — children of an excluded directory can never leak into a scan
/// even when checked directly.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    rules: Vec<(ExclusionRule, Regex)>,
}

impl ExclusionSet {
    /// Compile the active rules. Malformed patterns are dropped silently,
    /// mirroring the classifier's totality guarantee.
    pub fn build(rules: &[ExclusionRule]) -> Self {
        let compiled = rules
            .iter()
            .filter(|r| r.active)
            .filter_map(|r| glob_to_regex(&r.pattern).ok().map(|re| (r.clone(), re)))
            .collect();
        Self { rules: compiled }
    }

    /// Whether the scanner must skip this path entirely.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let mut current = Some(path);
        while let Some(p) = current {
            let haystack = normalize_for_matching(p);
            if self.rules.iter().any(|(_, re)| re.is_match(&haystack)) {
                return true;
            }
            current = p.parent();
        }
        false
    }

    /// Active pattern strings, for the scan record's exclusion snapshot.
    pub fn pattern_snapshot(&self) -> Vec<String> {
        self.rules.iter().map(|(r, _)| r.pattern.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Glob engine
// ---------------------------------------------------------------------------

/// Validate that a glob pattern can be compiled.
pub fn validate_glob_pattern(pattern: &str) -> Result<()> {
    glob_to_regex(pattern).map(|_| ())
}

/// Convert a shell-style glob pattern to an anchored regex.
///
/// Supports:
/// - `**` matches any path (including separators)
/// - `*`  matches anything except `/`
/// - `?`  matches a single character except `/`
///
/// Patterns starting with `~` are expanded against `$HOME` first.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    if pattern.trim().is_empty() {
        return Err(WardenError::InvalidConfig {
            details: "empty glob pattern".to_string(),
        });
    }

    let expanded = crate::core::paths::expand_home(pattern);
    let normalized = expanded.replace('\\', "/");
    let mut regex_str = String::with_capacity(normalized.len() * 2);
    regex_str.push('^');

    let chars: Vec<char> = normalized.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                if i + 2 < chars.len() && chars[i + 2] == '/' {
                    regex_str.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    regex_str.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                regex_str.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex_str.push_str("[^/]");
                i += 1;
            }
            '.' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '|' | '\\' => {
                regex_str.push('\\');
                regex_str.push(chars[i]);
                i += 1;
            }
            c => {
                regex_str.push(c);
                i += 1;
            }
        }
    }

    regex_str.push('$');

    Regex::new(&regex_str).map_err(|err| WardenError::InvalidConfig {
        details: format!("invalid glob pattern {pattern:?}: {err}"),
    })
}

fn normalize_for_matching(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// ---------------------------------------------------------------------------
// Built-in category table
// ---------------------------------------------------------------------------

fn category(
    name: &str,
    description: &str,
    patterns: &[&str],
    deletable: bool,
    restoration_hint: &str,
    priority: i64,
) -> Category {
    Category {
        name: name.to_string(),
        description: description.to_string(),
        patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
        deletable,
        restoration_hint: restoration_hint.to_string(),
        priority,
    }
}

/// Default category definitions.
///
/// These mirror the allow-list a developer workstation actually accumulates:
/// package caches, virtualenvs, build output, and editor litter. The external
/// config collaborator may replace the whole table.
pub fn default_categories() -> Vec<Category> {
    vec![
        category(
            "git_history",
            "Git repository data",
            &["**/.git", "**/.git/**"],
            false,
            DO_NOT_DELETE,
            1000,
        ),
        category(
            "node_modules",
            "Node.js dependency trees",
            &["**/node_modules", "**/node_modules/**"],
            true,
            "npm install (or yarn/pnpm install)",
            100,
        ),
        category(
            "python_venv",
            "Python virtual environments",
            &["**/.venv", "**/venv", "**/env"],
            true,
            "python -m venv && pip install -r requirements.txt",
            90,
        ),
        category(
            "python_cache",
            "Python bytecode and tool caches",
            &[
                "**/__pycache__",
                "**/*.pyc",
                "**/*.pyo",
                "**/.pytest_cache",
                "**/.mypy_cache",
                "**/.ruff_cache",
            ],
            true,
            NO_RESTORATION_NEEDED,
            85,
        ),
        category(
            "rust_target",
            "Rust build artifacts",
            &["**/target/debug", "**/target/release"],
            true,
            "cargo build",
            80,
        ),
        category(
            "go_build_cache",
            "Go build and module caches",
            &["~/.cache/go-build/**", "**/pkg/mod/**"],
            true,
            "go build (cache repopulates on demand)",
            75,
        ),
        category(
            "js_build_output",
            "JavaScript/TypeScript build output",
            &["**/dist", "**/build", "**/.next", "**/.nuxt"],
            true,
            "re-run the project build",
            70,
        ),
        category(
            "ide_cache",
            "IDE and editor caches",
            &["**/.vscode/cache", "**/.idea/cache", "**/.idea/caches"],
            true,
            NO_RESTORATION_NEEDED,
            60,
        ),
        category(
            "macos_metadata",
            "Finder metadata files",
            &["**/.DS_Store", "**/.localized"],
            true,
            NO_RESTORATION_NEEDED,
            50,
        ),
        category(
            "logs",
            "Log files and directories",
            &["**/*.log", "**/logs", "**/_logs"],
            true,
            NO_RESTORATION_NEEDED,
            40,
        ),
        category(
            "temp_cache",
            "Temporary and cache directories",
            &["**/tmp", "**/temp", "**/.tmp", "**/cache", "**/.cache"],
            true,
            NO_RESTORATION_NEEDED,
            30,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn builtin() -> CategorySet {
        CategorySet::builtin()
    }

    #[test]
    fn builtin_table_compiles_without_drops() {
        let set = builtin();
        assert_eq!(set.dropped_pattern_count(), 0);
        assert!(set.len() >= 10);
    }

    #[test]
    fn node_modules_classified_deletable() {
        let set = builtin();
        let cat = set
            .classify(Path::new("/root/project/node_modules"))
            .unwrap();
        assert_eq!(cat.name, "node_modules");
        assert!(cat.deletable);
        assert!(!cat.restoration_hint.is_empty());
    }

    #[test]
    fn git_dir_classified_protected() {
        let set = builtin();
        let cat = set.classify(Path::new("/root/project/.git")).unwrap();
        assert_eq!(cat.name, "git_history");
        assert!(!cat.deletable);
        assert_eq!(cat.restoration_hint, DO_NOT_DELETE);
    }

    #[test]
    fn git_wins_over_lower_priority_matches() {
        // .git/logs matches both git_history and logs; priority decides.
        let set = builtin();
        let cat = set.classify(Path::new("/root/project/.git/logs")).unwrap();
        assert_eq!(cat.name, "git_history");
    }

    #[test]
    fn unmatched_path_is_uncategorized() {
        let set = builtin();
        assert!(set.classify(Path::new("/root/project/src/main.rs")).is_none());
    }

    #[test]
    fn classification_is_deterministic() {
        let set = builtin();
        let path = Path::new("/home/u/app/dist");
        let a = set.classify(path).map(|c| c.name.clone());
        let b = set.classify(path).map(|c| c.name.clone());
        assert_eq!(a, b);
    }

    #[test]
    fn equal_priority_ties_break_by_name() {
        let set = CategorySet::build(vec![
            category("zeta", "", &["**/thing"], true, "N/A", 5),
            category("alpha", "", &["**/thing"], true, "N/A", 5),
        ])
        .unwrap();
        assert_eq!(set.classify(Path::new("/x/thing")).unwrap().name, "alpha");
    }

    #[test]
    fn malformed_pattern_dropped_not_fatal() {
        let set = CategorySet::build(vec![category(
            "broken",
            "",
            &["", "**/ok"],
            true,
            "N/A",
            1,
        )])
        .unwrap();
        assert_eq!(set.dropped_pattern_count(), 1);
        assert!(set.classify(Path::new("/a/ok")).is_some());
    }

    #[test]
    fn non_deletable_requires_sentinel() {
        let bad = category("locked", "", &["**/x"], false, "reinstall", 1);
        assert!(CategorySet::build(vec![bad]).is_err());
    }

    #[test]
    fn deletable_requires_hint() {
        let bad = category("loose", "", &["**/x"], true, "  ", 1);
        assert!(CategorySet::build(vec![bad]).is_err());
    }

    #[test]
    fn exclusion_matches_path_and_descendants() {
        let set = ExclusionSet::build(&[ExclusionRule {
            pattern: "/data/mirror".to_string(),
            reason: "network mount".to_string(),
            active: true,
        }]);
        assert!(set.is_excluded(Path::new("/data/mirror")));
        assert!(set.is_excluded(Path::new("/data/mirror/deep/file")));
        assert!(!set.is_excluded(Path::new("/data/mirrors")));
    }

    #[test]
    fn inactive_exclusions_ignored() {
        let set = ExclusionSet::build(&[ExclusionRule {
            pattern: "/data/mirror".to_string(),
            reason: String::new(),
            active: false,
        }]);
        assert!(set.is_empty());
        assert!(!set.is_excluded(Path::new("/data/mirror")));
    }

    #[test]
    fn exclusion_glob_patterns() {
        let set = ExclusionSet::build(&[ExclusionRule {
            pattern: "/home/*/Mounts".to_string(),
            reason: String::new(),
            active: true,
        }]);
        assert!(set.is_excluded(Path::new("/home/alice/Mounts")));
        assert!(set.is_excluded(Path::new("/home/alice/Mounts/nfs/share")));
        assert!(!set.is_excluded(Path::new("/home/alice/Documents")));
    }

    #[test]
    fn glob_star_stays_within_component() {
        let re = glob_to_regex("/tmp/build-*").unwrap();
        assert!(re.is_match("/tmp/build-abc"));
        assert!(!re.is_match("/tmp/build-abc/nested"));
    }

    #[test]
    fn glob_double_star_crosses_components() {
        let re = glob_to_regex("/data/**/target").unwrap();
        assert!(re.is_match("/data/projects/foo/target"));
        assert!(re.is_match("/data/target"));
        assert!(!re.is_match("/data/projects/foo/targets"));
    }

    #[test]
    fn glob_question_mark_single_char() {
        let re = glob_to_regex("/tmp/build-?").unwrap();
        assert!(re.is_match("/tmp/build-A"));
        assert!(!re.is_match("/tmp/build-AB"));
        assert!(!re.is_match("/tmp/build-"));
    }

    #[test]
    fn empty_pattern_invalid() {
        assert!(validate_glob_pattern("").is_err());
        assert!(validate_glob_pattern("   ").is_err());
    }

    #[test]
    fn pattern_snapshot_lists_active_rules() {
        let set = ExclusionSet::build(&[
            ExclusionRule {
                pattern: "/a".to_string(),
                reason: String::new(),
                active: true,
            },
            ExclusionRule {
                pattern: "/b".to_string(),
                reason: String::new(),
                active: false,
            },
        ]);
        assert_eq!(set.pattern_snapshot(), vec!["/a".to_string()]);
    }

    proptest::proptest! {
        // classify() must be total and deterministic for arbitrary path input.
        #[test]
        fn classify_never_panics(raw in "\\PC{0,80}") {
            let set = builtin();
            let path = PathBuf::from(&raw);
            let first = set.classify(&path).map(|c| c.name.clone());
            let second = set.classify(&path).map(|c| c.name.clone());
            proptest::prop_assert_eq!(first, second);
        }
    }
}
