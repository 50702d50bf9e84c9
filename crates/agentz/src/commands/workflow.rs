//! Commit / merge / revert / archive workflow subcommands.

use clap::Args;

use agentz_core::Services;
use agentz_core::workflow;
use agentz_protocol::SessionId;
use agentz_store::retention_sweep;

use super::{CommandResult, print_json};

#[derive(Debug, Args)]
pub struct CommitArgs {
    pub task_path: String,
    pub message: String,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    pub task_path: String,
    pub session_id: String,
}

#[derive(Debug, Args)]
pub struct RevertArgs {
    pub task_path: String,
    pub merge_hash: String,
}

#[derive(Debug, Args)]
pub struct ArchiveArgs {
    pub task_path: String,
}

#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Also remove orphans with uncommitted changes.
    #[arg(long)]
    pub force: bool,
}

pub fn commit(services: &Services, args: CommitArgs, json: bool) -> CommandResult {
    let outcome = workflow::commit_task_files(services, &args.task_path, &args.message)?;
    if json {
        print_json(&outcome)
    } else {
        println!("Committed {} files as {}", outcome.files.len(), outcome.hash);
        Ok(())
    }
}

pub fn merge(services: &Services, args: MergeArgs, json: bool) -> CommandResult {
    let outcome = workflow::merge_task_session(
        services,
        &args.task_path,
        &SessionId::new(&args.session_id),
    )?;
    if json {
        print_json(&outcome)
    } else {
        println!("Merged as {}", outcome.merge_commit_hash);
        Ok(())
    }
}

pub fn revert(services: &Services, args: RevertArgs, json: bool) -> CommandResult {
    let revert_hash = workflow::revert_task_merge(services, &args.task_path, &args.merge_hash)?;
    if json {
        print_json(&serde_json::json!({"revertHash": revert_hash}))
    } else {
        println!("Reverted {} as {}", args.merge_hash, revert_hash);
        Ok(())
    }
}

pub fn archive(services: &Services, args: ArchiveArgs, json: bool) -> CommandResult {
    let outcome = workflow::archive_task(services, &args.task_path)?;
    if json {
        print_json(&outcome)
    } else {
        println!(
            "Archived to {} (commit {}, {} worktrees removed)",
            outcome.archived_path, outcome.commit_hash, outcome.worktrees_removed
        );
        Ok(())
    }
}

pub fn cleanup(services: &Services, args: CleanupArgs, json: bool) -> CommandResult {
    let active: Vec<String> = agentz_store::aggregates::active_sessions(&services.store)?
        .into_iter()
        .map(|session| session.id.into_inner())
        .collect();
    let removed = agentz_git::cleanup_orphaned(services.repo_root(), &active, args.force)?;
    if json {
        print_json(&serde_json::json!({"removed": removed}))
    } else {
        println!("Removed {} orphaned worktrees", removed);
        Ok(())
    }
}

pub fn sweep(services: &Services, json: bool) -> CommandResult {
    let outcome = retention_sweep(
        &services.store,
        services.config.runtime.max_session_age_ms,
        services.config.runtime.max_sessions_count,
        chrono::Utc::now(),
    )?;
    if json {
        print_json(&serde_json::json!({
            "tombstoned": outcome.tombstoned,
            "kept": outcome.kept,
        }))
    } else {
        println!(
            "Tombstoned {} sessions, kept {}",
            outcome.tombstoned, outcome.kept
        );
        Ok(())
    }
}
