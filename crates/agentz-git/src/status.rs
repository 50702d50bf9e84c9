//! Working-tree status via `git status --porcelain=v2`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::GitError;
use crate::runner::run_git_checked;
use crate::validation::ensure_in_repo;

/// Parsed working-tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    /// Paths with staged (index) changes.
    pub staged: Vec<String>,
    /// Paths with unstaged (worktree) changes.
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub ahead: i64,
    pub behind: i64,
}

impl GitStatus {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.modified.is_empty() && self.untracked.is_empty()
    }

    /// Whether `path` shows up anywhere in the status.
    pub fn contains(&self, path: &str) -> bool {
        self.staged.iter().any(|p| p == path)
            || self.modified.iter().any(|p| p == path)
            || self.untracked.iter().any(|p| p == path)
    }
}

/// Read the working-tree status of `cwd`.
pub fn status(cwd: &Path) -> Result<GitStatus, GitError> {
    ensure_in_repo(cwd)?;

    let output = run_git_checked(
        cwd,
        &["status", "--porcelain=v2", "--branch", "-z", "-u"],
    )?;

    let parsed = parse_porcelain_v2(&output.stdout);
    debug!(
        event = "git.status.read",
        cwd = %cwd.display(),
        staged = parsed.staged.len(),
        modified = parsed.modified.len(),
        untracked = parsed.untracked.len(),
    );
    Ok(parsed)
}

/// Parse `status --porcelain=v2 --branch -z` output.
///
/// Records are NUL-terminated; rename (`2`) records carry one extra
/// NUL-separated field (the original path), which is consumed and dropped —
/// rename entries report the new path only.
fn parse_porcelain_v2(bytes: &[u8]) -> GitStatus {
    let mut status = GitStatus::default();
    let mut fields = bytes.split(|b| *b == 0).map(String::from_utf8_lossy);

    while let Some(record) = fields.next() {
        let record = record.as_ref();
        if record.is_empty() {
            continue;
        }

        if let Some(header) = record.strip_prefix("# ") {
            parse_branch_header(header, &mut status);
            continue;
        }

        let mut parts = record.splitn(2, ' ');
        let kind = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("");

        match kind {
            "1" => parse_changed_entry(rest, 6, &mut status),
            "2" => {
                // Rename records carry an extra `R<score>` field before the
                // path, and their original path arrives as the next NUL
                // field — consumed and dropped (new path only).
                parse_changed_entry(rest, 7, &mut status);
                let _ = fields.next();
            }
            "u" => {
                // Unmerged: surface as modified so callers see the conflict.
                if let Some(path) = nth_field(rest, 9) {
                    status.modified.push(path.to_string());
                }
            }
            "?" => status.untracked.push(rest.to_string()),
            // "!" ignored entries and anything unknown are skipped.
            _ => {}
        }
    }

    status
}

fn parse_branch_header(header: &str, status: &mut GitStatus) {
    if let Some(head) = header.strip_prefix("branch.head ") {
        if head != "(detached)" {
            status.branch = Some(head.to_string());
        }
    } else if let Some(ab) = header.strip_prefix("branch.ab ") {
        for part in ab.split(' ') {
            if let Some(ahead) = part.strip_prefix('+') {
                status.ahead = ahead.parse().unwrap_or(0);
            } else if let Some(behind) = part.strip_prefix('-') {
                status.behind = behind.parse().unwrap_or(0);
            }
        }
    }
}

/// `1`/`2` records: `XY sub mH mI mW hH hI [X<score>] path`.
fn parse_changed_entry(rest: &str, fields_before_path: usize, status: &mut GitStatus) {
    let mut parts = rest.splitn(2, ' ');
    let xy = parts.next().unwrap_or("..");
    let rest = parts.next().unwrap_or("");

    let Some(path) = nth_field(rest, fields_before_path) else {
        return;
    };

    let mut chars = xy.chars();
    let index_state = chars.next().unwrap_or('.');
    let worktree_state = chars.next().unwrap_or('.');

    if index_state != '.' {
        status.staged.push(path.to_string());
    }
    if worktree_state != '.' {
        status.modified.push(path.to_string());
    }
}

/// The fields after `skip` space-separated fields, joined (paths may
/// contain spaces).
fn nth_field(rest: &str, skip: usize) -> Option<&str> {
    let mut remaining = rest;
    for _ in 0..skip {
        let index = remaining.find(' ')?;
        remaining = &remaining[index + 1..];
    }
    (!remaining.is_empty()).then_some(remaining)
}
