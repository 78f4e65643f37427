//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve
/// symlinks and normalize components. If it fails (e.g. path does not exist),
/// the path is made absolute relative to CWD and `..`/`.` components are
/// resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

/// Expand a leading `~` or `~/` to the user's home directory.
///
/// Patterns from the protected-path and category tables use `~` for user
/// data locations; the glob engine needs them absolute. A pattern without a
/// leading tilde is returned unchanged, as is a tilde pattern when `HOME` is
/// unset.
pub fn expand_home(pattern: &str) -> String {
    if pattern == "~" {
        return env::var("HOME").unwrap_or_else(|_| pattern.to_string());
    }
    if let Some(rest) = pattern.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            let home = home.strip_suffix('/').unwrap_or(&home);
            return format!("{home}/{rest}");
        }
    }
    pattern.to_string()
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_existing_path_canonically() {
        let cwd = env::current_dir().unwrap();
        let resolved = resolve_absolute_path(Path::new("."));
        assert_eq!(resolved, std::fs::canonicalize(&cwd).unwrap());
    }

    #[test]
    fn normalizes_nonexistent_path_syntactically() {
        let input = Path::new("/nonexistent/foo/../bar");
        assert!(std::fs::canonicalize(input).is_err());
        assert_eq!(resolve_absolute_path(input), PathBuf::from("/nonexistent/bar"));
    }

    #[test]
    fn relative_path_is_anchored_to_cwd() {
        let resolved = resolve_absolute_path(Path::new("some/relative/dir"));
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("some/relative/dir"));
    }

    #[test]
    fn expand_home_substitutes_tilde_prefix() {
        if let Ok(home) = env::var("HOME") {
            let home = home.strip_suffix('/').unwrap_or(&home).to_string();
            assert_eq!(expand_home("~/Documents/**"), format!("{home}/Documents/**"));
        }
    }

    #[test]
    fn expand_home_leaves_plain_patterns_alone() {
        assert_eq!(expand_home("/System/**"), "/System/**");
        assert_eq!(expand_home("**/node_modules/**"), "**/node_modules/**");
    }
}
