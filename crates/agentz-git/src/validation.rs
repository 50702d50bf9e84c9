//! Input validation shared by every git operation.
//!
//! Paths are validated against the repository root before git sees them;
//! branch names are validated against git's ref rules plus local extras.
//! Validation failures are programmer errors surfaced as typed errors, and
//! git is never invoked with an unvalidated argument.

use std::path::{Component, Path, PathBuf};

use git2::Repository;

use crate::errors::GitError;

/// Check if a path is inside a git repository.
///
/// Uses `Repository::discover` which traverses parent directories.
pub fn is_git_repo(path: &Path) -> bool {
    Repository::discover(path).is_ok()
}

/// Verify that a path is inside a git repository.
pub fn ensure_in_repo(path: &Path) -> Result<(), GitError> {
    match Repository::discover(path) {
        Ok(_) => Ok(()),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Err(GitError::NotARepo {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(GitError::Git2Error { source: e }),
    }
}

/// Branch name validation: git's ref rules plus local extras.
///
/// Rejects empty names, leading `.` or `-`, trailing `.lock` or `/`,
/// `..` sequences, whitespace, control characters, and ref-syntax
/// metacharacters (`~ ^ : ? * [ \ @{`).
pub fn is_valid_branch_name(branch: &str) -> bool {
    if branch.is_empty() || branch.len() > 255 {
        return false;
    }
    if branch.starts_with('.') || branch.starts_with('-') || branch.starts_with('/') {
        return false;
    }
    if branch.ends_with('/') || branch.ends_with('.') || branch.ends_with(".lock") {
        return false;
    }
    if branch.contains("..") || branch.contains("//") || branch.contains("@{") {
        return false;
    }
    !branch.chars().any(|c| {
        c.is_whitespace()
            || c.is_control()
            || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')
    })
}

pub fn validate_branch_name(branch: &str) -> Result<(), GitError> {
    if is_valid_branch_name(branch) {
        Ok(())
    } else {
        Err(GitError::InvalidBranchName {
            branch: branch.to_string(),
        })
    }
}

/// Validate a repo-relative file path and resolve it against the repo root.
///
/// Rejects absolute paths, `..` components, and any path that would escape
/// the root after normalisation (P7). Returns the normalised relative path.
pub fn validate_repo_relative_path(repo_root: &Path, file: &str) -> Result<PathBuf, GitError> {
    if file.is_empty() {
        return Err(GitError::InvalidPath {
            path: file.to_string(),
            message: "path is empty".to_string(),
        });
    }
    if file.contains('\0') {
        return Err(GitError::InvalidPath {
            path: file.to_string(),
            message: "path contains NUL".to_string(),
        });
    }

    let candidate = Path::new(file);
    if candidate.is_absolute() {
        return Err(GitError::InvalidPath {
            path: file.to_string(),
            message: "absolute paths are not allowed".to_string(),
        });
    }

    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(GitError::InvalidPath {
                    path: file.to_string(),
                    message: "path escapes the repository root".to_string(),
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(GitError::InvalidPath {
                    path: file.to_string(),
                    message: "absolute paths are not allowed".to_string(),
                });
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(GitError::InvalidPath {
            path: file.to_string(),
            message: "path resolves to the repository root".to_string(),
        });
    }

    debug_assert!(repo_root.join(&normalized).starts_with(repo_root));
    Ok(normalized)
}

/// Validate a git argument to prevent injection.
///
/// Rejects values that start with `-` (option injection), contain control
/// characters, or contain `::` sequences (refspec injection).
pub fn validate_git_arg(value: &str, label: &str) -> Result<(), GitError> {
    if value.starts_with('-') {
        return Err(GitError::OperationFailed {
            message: format!("Invalid {label}: '{value}' (must not start with '-')"),
        });
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(GitError::OperationFailed {
            message: format!("Invalid {label}: contains control characters"),
        });
    }
    if value.contains("::") {
        return Err(GitError::OperationFailed {
            message: format!("Invalid {label}: '::' sequences are not allowed"),
        });
    }
    Ok(())
}
