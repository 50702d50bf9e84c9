//! Read-side git subcommands over a session worktree or the repo root.

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use agentz_core::Services;
use agentz_core::sessions;
use agentz_git::{DiffView, PushOptions};
use agentz_protocol::SessionId;

use super::{CommandResult, print_json};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Inspect this session's worktree instead of the repo root.
    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DiffViewArg {
    Auto,
    Staged,
    Working,
}

impl From<DiffViewArg> for DiffView {
    fn from(arg: DiffViewArg) -> Self {
        match arg {
            DiffViewArg::Auto => DiffView::Auto,
            DiffViewArg::Staged => DiffView::Staged,
            DiffViewArg::Working => DiffView::Working,
        }
    }
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    pub file: String,

    #[arg(long, value_enum, default_value_t = DiffViewArg::Auto)]
    pub view: DiffViewArg,

    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Debug, Args)]
pub struct CommitsArgs {
    /// Files to trace through history.
    #[arg(required = true, num_args = 1..)]
    pub files: Vec<String>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Debug, Args)]
pub struct PushArgs {
    #[arg(long)]
    pub remote: Option<String>,

    #[arg(long)]
    pub branch: Option<String>,

    #[arg(long)]
    pub set_upstream: bool,

    #[arg(long)]
    pub session: Option<String>,
}

/// Working directory for a command: the named session's worktree, else the
/// repo root.
fn resolve_cwd(services: &Services, session: &Option<String>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let Some(session_id) = session else {
        return Ok(services.repo_root().to_path_buf());
    };
    let session = sessions::get_session(services, &SessionId::new(session_id))?
        .ok_or_else(|| format!("Session '{}' not found", session_id))?;
    Ok(session
        .worktree_path
        .as_deref()
        .unwrap_or(&session.working_dir)
        .into())
}

pub fn status(services: &Services, args: StatusArgs, json: bool) -> CommandResult {
    let cwd = resolve_cwd(services, &args.session)?;
    let status = agentz_git::status(&cwd)?;
    if json {
        return print_json(&status);
    }
    if let Some(branch) = &status.branch {
        println!("On branch {} (+{} -{})", branch, status.ahead, status.behind);
    }
    for path in &status.staged {
        println!("staged:    {}", path);
    }
    for path in &status.modified {
        println!("modified:  {}", path);
    }
    for path in &status.untracked {
        println!("untracked: {}", path);
    }
    if status.is_clean() {
        println!("clean");
    }
    Ok(())
}

pub fn diff(services: &Services, args: DiffArgs, json: bool) -> CommandResult {
    let cwd = resolve_cwd(services, &args.session)?;
    let diff = agentz_git::diff_file(&cwd, &args.file, args.view.into())?;
    if json {
        return print_json(&diff);
    }
    if diff.is_binary {
        println!("Binary file {} differs", diff.path);
    } else {
        print!("{}", diff.patch);
    }
    Ok(())
}

pub fn commits(services: &Services, args: CommitsArgs, json: bool) -> CommandResult {
    let cwd = resolve_cwd(services, &args.session)?;
    let commits = agentz_git::commits_for_files(&cwd, &args.files, args.limit)?;
    if json {
        return print_json(&commits);
    }
    for commit in commits {
        println!("{}  {}  {}", &commit.hash[..7.min(commit.hash.len())], commit.date, commit.message);
    }
    Ok(())
}

pub fn push(services: &Services, args: PushArgs, json: bool) -> CommandResult {
    let cwd = resolve_cwd(services, &args.session)?;
    agentz_git::push(
        &cwd,
        &PushOptions {
            remote: args.remote,
            branch: args.branch,
            set_upstream: args.set_upstream,
        },
    )?;
    if json {
        print_json(&serde_json::json!({"success": true}))
    } else {
        println!("Pushed.");
        Ok(())
    }
}
