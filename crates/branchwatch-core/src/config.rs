//! State directory and per-branch directory resolution.
//!
//! # Storage Structure
//!
//! ```text
//! ~/.branchwatch/
//! └── branches/
//!     ├── main/
//!     │   ├── agent-sessions.json
//!     │   └── status-bar.json
//!     └── feature-login/
//! ```
//!
//! # Environment Variables
//!
//! - `BRANCHWATCH_STATE_DIR`: Override the base state directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable for a custom state directory.
pub const STATE_DIR_ENV: &str = "BRANCHWATCH_STATE_DIR";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".branchwatch";

const BRANCHES_SUBDIR: &str = "branches";

/// Fallback directory name for a branch that sanitizes to nothing.
const EMPTY_BRANCH_NAME: &str = "branch";

/// Get the branchwatch state directory.
///
/// Resolved on every call:
/// 1. `BRANCHWATCH_STATE_DIR` if set
/// 2. `~/.branchwatch` if a home directory is available
/// 3. `.branchwatch` in the current directory
pub fn state_dir() -> PathBuf {
    std::env::var(STATE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_STATE_DIR))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
        })
}

/// Maps a branch name onto a single safe path component.
///
/// Characters outside `[A-Za-z0-9._-]` become `-`, leading dots are
/// stripped, and an empty result becomes `branch`.
pub fn sanitize_branch_name(branch: &str) -> String {
    let replaced: String = branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();

    let trimmed = replaced.trim_start_matches('.');
    if trimmed.is_empty() {
        EMPTY_BRANCH_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Returns `<base>/branches/<sanitized branch>`, creating it if needed.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn branch_dir(base: &Path, branch: &str) -> io::Result<PathBuf> {
    let dir = base
        .join(BRANCHES_SUBDIR)
        .join(sanitize_branch_name(branch));
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Resolves branch directories under a fixed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDirs {
    root: PathBuf,
}

impl Default for BranchDirs {
    fn default() -> Self {
        Self::new(state_dir())
    }
}

impl BranchDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory for `branch`, creating it if needed.
    pub fn resolve(&self, branch: &str) -> io::Result<PathBuf> {
        branch_dir(&self.root, branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_keeps_safe_names() {
        assert_eq!(sanitize_branch_name("main"), "main");
        assert_eq!(sanitize_branch_name("release-1.2_rc"), "release-1.2_rc");
    }

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_branch_name("feature/login"), "feature-login");
        assert_eq!(sanitize_branch_name("fix bug #12"), "fix-bug--12");
        assert_eq!(sanitize_branch_name("a\\b:c"), "a-b-c");
    }

    #[test]
    fn test_sanitize_blocks_traversal() {
        assert_eq!(sanitize_branch_name(".."), "branch");
        assert_eq!(sanitize_branch_name("../etc"), "-etc");
        assert_eq!(sanitize_branch_name(".hidden"), "hidden");
        assert_eq!(sanitize_branch_name(""), "branch");
    }

    #[test]
    fn test_branch_dir_creates_directory() {
        let dir = tempdir().unwrap();

        let path = branch_dir(dir.path(), "feature/x").unwrap();

        assert_eq!(path, dir.path().join("branches").join("feature-x"));
        assert!(path.is_dir());
    }

    #[test]
    fn test_branch_dirs_resolve_is_idempotent() {
        let dir = tempdir().unwrap();
        let dirs = BranchDirs::new(dir.path());

        let first = dirs.resolve("main").unwrap();
        let second = dirs.resolve("main").unwrap();

        assert_eq!(first, second);
        assert_eq!(dirs.root(), dir.path());
    }

    #[test]
    fn test_state_dir_name() {
        // Env may be set by the host; only check the default shape.
        if std::env::var(STATE_DIR_ENV).is_err() {
            assert!(state_dir().ends_with(DEFAULT_STATE_DIR));
        }
    }
}
