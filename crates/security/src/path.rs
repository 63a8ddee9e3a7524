//! Path validation: filesystem sandboxing to allowed roots.
//!
//! Paths are canonicalised (resolving `..`, symlinks, and platform
//! prefixes) and then prefix-checked against the allowed roots. Paths
//! that do not exist yet (the write case) are resolved through their
//! nearest existing ancestor before the check.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathPolicyError {
    #[error("Path not allowed: '{path}' is outside the permitted roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path not allowed: cannot resolve '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// The set of roots a tool profile may touch.
///
/// In sandbox mode there is exactly one fixed root; otherwise the
/// process working directory and the conventional temp prefix.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    roots: Vec<PathBuf>,
}

impl PathPolicy {
    /// Sandbox policy: a single fixed directory.
    pub fn sandboxed(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    /// Default policy: the current working directory plus the system
    /// temp directory.
    pub fn for_cwd() -> Self {
        let mut roots = Vec::new();
        if let Ok(cwd) = std::env::current_dir()
            && let Ok(cwd) = cwd.canonicalize()
        {
            roots.push(cwd);
        }
        if let Ok(tmp) = std::env::temp_dir().canonicalize() {
            roots.push(tmp);
        }
        Self { roots }
    }

    /// Explicit roots (used by tests and the KV store).
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Validate a path for reading or writing.
    ///
    /// Returns the canonicalised path on success. Relative paths are
    /// resolved against the first allowed root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathPolicyError> {
        let input = Path::new(path);
        let joined;
        let input: &Path = if input.is_absolute() {
            input
        } else {
            let base = self
                .roots
                .first()
                .ok_or_else(|| PathPolicyError::OutsideAllowedRoots { path: path.into() })?;
            joined = base.join(input);
            &joined
        };

        let canonical = self.canonicalize_lenient(input, path)?;

        if self.roots.iter().any(|root| canonical.starts_with(root)) {
            Ok(canonical)
        } else {
            Err(PathPolicyError::OutsideAllowedRoots { path: path.into() })
        }
    }

    /// Canonicalise, falling back to canonical-parent + basename when
    /// the path itself does not exist yet.
    fn canonicalize_lenient(
        &self,
        input: &Path,
        original: &str,
    ) -> Result<PathBuf, PathPolicyError> {
        if input.exists() {
            return input
                .canonicalize()
                .map_err(|e| PathPolicyError::CanonicalizeFailed {
                    path: original.into(),
                    reason: e.to_string(),
                });
        }
        let parent = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| PathPolicyError::OutsideAllowedRoots {
                path: original.into(),
            })?;
        let file_name =
            input
                .file_name()
                .ok_or_else(|| PathPolicyError::OutsideAllowedRoots {
                    path: original.into(),
                })?;
        // Walk up until an existing ancestor is found so freshly created
        // nested directories still resolve.
        let mut missing = vec![file_name.to_os_string()];
        let mut cursor = parent.to_path_buf();
        while !cursor.exists() {
            let Some(name) = cursor.file_name().map(|n| n.to_os_string()) else {
                return Err(PathPolicyError::CanonicalizeFailed {
                    path: original.into(),
                    reason: "no existing ancestor".into(),
                });
            };
            missing.push(name);
            cursor = match cursor.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => {
                    return Err(PathPolicyError::CanonicalizeFailed {
                        path: original.into(),
                        reason: "no existing ancestor".into(),
                    });
                }
            };
        }
        let mut canonical =
            cursor
                .canonicalize()
                .map_err(|e| PathPolicyError::CanonicalizeFailed {
                    path: original.into(),
                    reason: e.to_string(),
                })?;
        for name in missing.iter().rev() {
            canonical.push(name);
        }
        Ok(canonical)
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn path_inside_root_allowed() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello").unwrap();

        let policy = PathPolicy::sandboxed(dir.path().canonicalize().unwrap());
        let resolved = policy.resolve(file.to_str().unwrap()).unwrap();
        assert!(resolved.ends_with("notes.txt"));
    }

    #[test]
    fn relative_path_resolves_against_root() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        let policy = PathPolicy::sandboxed(dir.path().canonicalize().unwrap());
        assert!(policy.resolve("a.txt").is_ok());
    }

    #[test]
    fn dotdot_escape_rejected() {
        let dir = tempdir().unwrap();
        let policy = PathPolicy::sandboxed(dir.path().canonicalize().unwrap());

        let err = policy.resolve("../../etc/passwd").unwrap_err();
        assert!(err.to_string().contains("not allowed"), "{err}");
    }

    #[test]
    fn absolute_traversal_rejected() {
        let dir = tempdir().unwrap();
        let policy = PathPolicy::sandboxed(dir.path().canonicalize().unwrap());
        assert!(policy.resolve("/etc/passwd").is_err());
    }

    #[test]
    fn nonexistent_file_in_root_allowed_for_write() {
        let dir = tempdir().unwrap();
        let policy = PathPolicy::sandboxed(dir.path().canonicalize().unwrap());

        let resolved = policy.resolve("new_dir/new_file.txt").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn nonexistent_path_escaping_root_rejected() {
        let dir = tempdir().unwrap();
        let policy = PathPolicy::sandboxed(dir.path().canonicalize().unwrap());
        let outside = format!("{}/../nope/file.txt", dir.path().display());
        assert!(policy.resolve(&outside).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_rejected() {
        let root = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        let link = root.path().join("sneaky");
        std::os::unix::fs::symlink(elsewhere.path(), &link).unwrap();

        let policy = PathPolicy::sandboxed(root.path().canonicalize().unwrap());
        let target = format!("{}/file.txt", link.display());
        assert!(policy.resolve(&target).is_err());
    }

    #[test]
    fn multiple_roots_any_match() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        std::fs::write(b.path().join("f"), "x").unwrap();
        let policy = PathPolicy::with_roots(vec![
            a.path().canonicalize().unwrap(),
            b.path().canonicalize().unwrap(),
        ]);
        assert!(policy.resolve(b.path().join("f").to_str().unwrap()).is_ok());
    }
}
