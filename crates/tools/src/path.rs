//! Path validation: keeps workspace file access inside the project root.
//!
//! Model-supplied paths are relative to the root. Absolute paths, `..`
//! components and symlinks resolving outside the root are rejected.

use std::path::{Component, Path, PathBuf};

/// Path components that are never readable or writable by tools.
const FORBIDDEN_COMPONENTS: &[&str] = &[".git"];

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path is empty")]
    Empty,

    #[error("Path '{path}' is outside the project root")]
    OutsideRoot { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Normalize a model-supplied path to `a/b/c` form.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve `relative` under `root`, returning the absolute path.
pub fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf, PathValidationError> {
    let raw = relative.replace('\\', "/");
    if raw.starts_with('/') || Path::new(relative).is_absolute() {
        return Err(PathValidationError::OutsideRoot { path: relative.into() });
    }

    let normalized = normalize(relative);
    if normalized.is_empty() {
        return Err(PathValidationError::Empty);
    }

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                if let Some(pattern) = FORBIDDEN_COMPONENTS.iter().find(|f| **f == name) {
                    return Err(PathValidationError::ForbiddenPath {
                        path: relative.into(),
                        pattern: (*pattern).to_string(),
                    });
                }
            }
            Component::ParentDir => {
                return Err(PathValidationError::PathTraversal { path: relative.into() });
            }
            _ => return Err(PathValidationError::OutsideRoot { path: relative.into() }),
        }
    }

    let joined = root.join(&normalized);

    // Symlinks: the deepest existing ancestor must still resolve inside the root
    let canonical_root = root
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
    let mut existing = joined.as_path();
    while !existing.exists() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }
    if existing.exists() {
        let canonical = existing
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: relative.into(),
                reason: e.to_string(),
            })?;
        if !canonical.starts_with(&canonical_root) {
            return Err(PathValidationError::OutsideRoot { path: relative.into() });
        }
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_dots_and_slashes() {
        assert_eq!(normalize("./src//popup.js"), "src/popup.js");
        assert_eq!(normalize("src\\bg.js"), "src/bg.js");
        assert_eq!(normalize("."), "");
    }

    #[test]
    fn relative_path_resolves_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_in_root(dir.path(), "src/popup.js").unwrap();
        assert_eq!(resolved, dir.path().join("src/popup.js"));
    }

    #[test]
    fn traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_in_root(dir.path(), "../../etc/passwd").unwrap_err();
        assert!(matches!(err, PathValidationError::PathTraversal { .. }));

        let err = resolve_in_root(dir.path(), "src/../../secret").unwrap_err();
        assert!(matches!(err, PathValidationError::PathTraversal { .. }));
    }

    #[test]
    fn absolute_path_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_in_root(dir.path(), "/etc/passwd").unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideRoot { .. }));
    }

    #[test]
    fn forbidden_component_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_in_root(dir.path(), ".git/config").unwrap_err();
        match err {
            PathValidationError::ForbiddenPath { pattern, .. } => assert_eq!(pattern, ".git"),
            other => panic!("Expected ForbiddenPath, got: {other}"),
        }
    }

    #[test]
    fn empty_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_in_root(dir.path(), "./").unwrap_err(),
            PathValidationError::Empty
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_blocked() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = resolve_in_root(dir.path(), "link/file.txt").unwrap_err();
        assert!(matches!(err, PathValidationError::OutsideRoot { .. }));
    }
}
