//! Non-interactive push.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::GitError;
use crate::runner::{run_git_checked, run_git};
use crate::validation::{ensure_in_repo, validate_branch_name, validate_git_arg};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub set_upstream: bool,
}

/// Push the given (or current) branch.
///
/// Remote selection: explicit remote, else the branch's configured
/// upstream remote, else `origin` when present, else the first remote.
/// Terminal prompts are disabled by the runner; a push that needs
/// credentials the environment cannot supply fails rather than hangs.
pub fn push(cwd: &Path, options: &PushOptions) -> Result<(), GitError> {
    ensure_in_repo(cwd)?;

    let branch = match &options.branch {
        Some(branch) => {
            validate_branch_name(branch)?;
            branch.clone()
        }
        None => run_git_checked(cwd, &["rev-parse", "--abbrev-ref", "HEAD"])?
            .stdout_text()
            .trim()
            .to_string(),
    };

    let remote = match &options.remote {
        Some(remote) => {
            validate_git_arg(remote, "remote name")?;
            remote.clone()
        }
        None => pick_remote(cwd, &branch)?,
    };

    let mut args: Vec<&str> = vec!["push"];
    if options.set_upstream {
        args.push("--set-upstream");
    }
    args.push(&remote);
    args.push(&branch);
    run_git_checked(cwd, &args)?;

    info!(
        event = "git.remote.push_completed",
        remote = %remote,
        branch = %branch,
        cwd = %cwd.display(),
    );
    Ok(())
}

fn pick_remote(cwd: &Path, branch: &str) -> Result<String, GitError> {
    // Upstream if configured for this branch.
    let upstream_key = format!("branch.{}.remote", branch);
    if let Ok(output) = run_git(cwd, &["config", "--get", upstream_key.as_str()])
        && output.success()
    {
        let upstream = output.stdout_text().trim().to_string();
        if !upstream.is_empty() {
            return Ok(upstream);
        }
    }

    let remotes = run_git_checked(cwd, &["remote"])?.stdout_text();
    let mut names = remotes.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = names.next().map(str::to_string);
    if remotes.lines().any(|l| l.trim() == "origin") {
        return Ok("origin".to_string());
    }
    first.ok_or(GitError::NoRemote)
}
