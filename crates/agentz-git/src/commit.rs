//! Scoped commits and file-history queries.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::GitError;
use crate::runner::run_git_checked;
use crate::validation::{ensure_in_repo, validate_repo_relative_path};

/// Commit exactly the given files, nothing else.
///
/// Paths are validated against the repo root and staged individually; the
/// commit message travels through a mode-0600 temp file so it never hits a
/// command line. Returns the short hash of the new commit.
pub fn commit_scoped(cwd: &Path, files: &[String], message: &str) -> Result<String, GitError> {
    ensure_in_repo(cwd)?;
    if files.is_empty() {
        return Err(GitError::OperationFailed {
            message: "commit_scoped requires at least one file".to_string(),
        });
    }
    if message.trim().is_empty() {
        return Err(GitError::OperationFailed {
            message: "commit message cannot be empty".to_string(),
        });
    }

    let mut relative_paths = Vec::with_capacity(files.len());
    for file in files {
        let relative = validate_repo_relative_path(cwd, file)?;
        relative_paths.push(relative.to_string_lossy().into_owned());
    }

    let mut add_args: Vec<&str> = vec!["add", "--"];
    add_args.extend(relative_paths.iter().map(String::as_str));
    run_git_checked(cwd, &add_args)?;

    let message_file = write_message_file(message)?;
    let message_path = message_file.path().to_string_lossy().into_owned();

    let mut commit_args: Vec<&str> = vec!["commit", "--file", &message_path, "--only", "--"];
    commit_args.extend(relative_paths.iter().map(String::as_str));
    run_git_checked(cwd, &commit_args)?;

    let hash = run_git_checked(cwd, &["rev-parse", "--short", "HEAD"])?
        .stdout_text()
        .trim()
        .to_string();

    info!(
        event = "git.commit.scoped_completed",
        cwd = %cwd.display(),
        files = relative_paths.len(),
        hash = %hash,
    );
    Ok(hash)
}

/// Commit message temp file, created 0600 so message content is not
/// world-readable while git runs.
fn write_message_file(message: &str) -> Result<tempfile::NamedTempFile, GitError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("agentz-commit-msg-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let file = builder.tempfile().map_err(|e| GitError::IoError { source: e })?;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))
            .map_err(|e| GitError::IoError { source: e })?;
        let mut file = file;
        file.write_all(message.as_bytes())
            .map_err(|e| GitError::IoError { source: e })?;
        file.flush().map_err(|e| GitError::IoError { source: e })?;
        return Ok(file);
    }
    #[cfg(not(unix))]
    {
        let mut file = builder.tempfile().map_err(|e| GitError::IoError { source: e })?;
        file.write_all(message.as_bytes())
            .map_err(|e| GitError::IoError { source: e })?;
        file.flush().map_err(|e| GitError::IoError { source: e })?;
        Ok(file)
    }
}

/// One commit touching a set of files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub author: String,
    pub date: String,
    pub timestamp: i64,
    pub files: Vec<String>,
}

/// Recent commits touching any of `files`, newest first.
///
/// Uses NUL-delimited `git log` records so messages with newlines parse
/// unambiguously.
pub fn commits_for_files(
    cwd: &Path,
    files: &[String],
    limit: usize,
) -> Result<Vec<CommitInfo>, GitError> {
    ensure_in_repo(cwd)?;
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let mut relative_paths = Vec::with_capacity(files.len());
    for file in files {
        let relative = validate_repo_relative_path(cwd, file)?;
        relative_paths.push(relative.to_string_lossy().into_owned());
    }

    let limit_arg = format!("--max-count={}", limit);
    // %x00 separators inside a record, %x01 between records.
    let mut args: Vec<&str> = vec![
        "log",
        &limit_arg,
        "--name-only",
        "--pretty=format:%x01%H%x00%s%x00%an%x00%aI%x00%at%x00",
        "--",
    ];
    args.extend(relative_paths.iter().map(String::as_str));

    let output = run_git_checked(cwd, &args)?;
    let text = output.stdout_text();

    let mut commits = Vec::new();
    for record in text.split('\u{01}').filter(|r| !r.trim().is_empty()) {
        let mut fields = record.split('\u{00}');
        let (Some(hash), Some(message), Some(author), Some(date), Some(timestamp)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            warn!(event = "git.commit.log_record_malformed", record = %record.trim());
            continue;
        };
        let Ok(timestamp) = timestamp.trim().parse::<i64>() else {
            warn!(event = "git.commit.log_timestamp_malformed", value = %timestamp);
            continue;
        };

        let touched: Vec<String> = fields
            .next()
            .unwrap_or("")
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        commits.push(CommitInfo {
            hash: hash.trim().to_string(),
            message: message.to_string(),
            author: author.to_string(),
            date: date.to_string(),
            timestamp,
            files: touched,
        });
    }

    Ok(commits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::run_git;

    fn init_repo(dir: &Path) {
        let repo = git2::Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
    }

    #[test]
    fn test_commit_scoped_stages_only_listed_files() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());

        std::fs::write(dir.path().join("wanted.txt"), "in").unwrap();
        std::fs::write(dir.path().join("unwanted.txt"), "out").unwrap();

        let hash = commit_scoped(dir.path(), &["wanted.txt".to_string()], "add wanted").unwrap();
        assert!(hash.len() >= 7);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

        let show = run_git(dir.path(), &["show", "--name-only", "--pretty=format:", "HEAD"])
            .unwrap()
            .stdout_text();
        assert!(show.contains("wanted.txt"));
        assert!(!show.contains("unwanted.txt"));

        let status = crate::status::status(dir.path()).unwrap();
        assert_eq!(status.untracked, vec!["unwanted.txt"]);
    }

    #[test]
    fn test_commit_scoped_rejects_empty_inputs() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());
        assert!(commit_scoped(dir.path(), &[], "msg").is_err());
        assert!(commit_scoped(dir.path(), &["a.txt".to_string()], "  ").is_err());
    }

    #[test]
    fn test_commit_scoped_rejects_path_escape() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());
        let err = commit_scoped(dir.path(), &["../evil.txt".to_string()], "msg").unwrap_err();
        assert!(matches!(err, GitError::InvalidPath { .. }));
    }

    #[test]
    fn test_commits_for_files() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());

        std::fs::write(dir.path().join("a.txt"), "1").unwrap();
        commit_scoped(dir.path(), &["a.txt".to_string()], "first a").unwrap();
        std::fs::write(dir.path().join("b.txt"), "1").unwrap();
        commit_scoped(dir.path(), &["b.txt".to_string()], "first b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "2").unwrap();
        commit_scoped(dir.path(), &["a.txt".to_string()], "second a").unwrap();

        let commits = commits_for_files(dir.path(), &["a.txt".to_string()], 10).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "second a");
        assert_eq!(commits[1].message, "first a");
        assert_eq!(commits[0].author, "test");
        assert_eq!(commits[0].files, vec!["a.txt"]);
        assert!(commits[0].timestamp >= commits[1].timestamp);

        let limited = commits_for_files(dir.path(), &["a.txt".to_string()], 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_commits_for_files_empty_input() {
        let dir = tempfile::TempDir::new().unwrap();
        init_repo(dir.path());
        assert!(commits_for_files(dir.path(), &[], 10).unwrap().is_empty());
    }
}
