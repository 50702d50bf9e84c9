use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Local control plane for long-lived coding-assistant agent sessions.
#[derive(Debug, Parser)]
#[command(name = "agentz", version)]
struct Cli {
    /// Repository the control plane manages.
    #[arg(long, global = true, default_value = ".")]
    repo_root: PathBuf,

    /// Emit machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Verbose structured logs on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Spawn a new agent session.
    Spawn(commands::session::SpawnArgs),
    /// List non-deleted sessions, newest first.
    List,
    /// Show one session.
    Get(commands::session::GetArgs),
    /// Cancel a session's worker and record the cancellation.
    Cancel(commands::session::IdArg),
    /// Soft-delete a session (registry tombstone; the log stays on disk).
    Delete(commands::session::IdArg),
    /// Send a message to a finished session, resuming it with a new worker.
    Send(commands::session::SendArgs),
    /// Approve or deny a worker's pending request.
    Approve(commands::session::ApproveArgs),
    /// Files a session changed.
    Files(commands::session::IdArg),
    /// Worker liveness for a session.
    Daemon(commands::session::IdArg),
    /// Aggregate statistics over the registry.
    Stats(commands::stats::StatsArgs),
    /// Multi-agent debug runs.
    #[command(subcommand)]
    Debug(commands::debug::DebugCommand),
    /// Markdown task documents.
    #[command(subcommand)]
    Task(commands::task::TaskCommand),
    /// Commit the files a task's sessions touched.
    Commit(commands::workflow::CommitArgs),
    /// Merge a session's worktree branch into main and record it.
    Merge(commands::workflow::MergeArgs),
    /// Revert a recorded merge.
    Revert(commands::workflow::RevertArgs),
    /// Archive a task: tear down worktrees, move the file, commit the rename.
    Archive(commands::workflow::ArchiveArgs),
    /// Reclaim worktrees whose sessions are no longer active.
    Cleanup(commands::workflow::CleanupArgs),
    /// Tombstone old terminal sessions beyond the retention limits.
    Sweep,
    /// Working-tree status of the repo or a session worktree.
    Status(commands::git::StatusArgs),
    /// Diff one file.
    Diff(commands::git::DiffArgs),
    /// Recent commits touching the given files.
    Commits(commands::git::CommitsArgs),
    /// Push the current (or named) branch, non-interactively.
    Push(commands::git::PushArgs),
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let repo_root = match cli.repo_root.canonicalize() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Cannot resolve repo root '{}': {}", cli.repo_root.display(), e);
            std::process::exit(1);
        }
    };

    let config = match agentz_config::load_hierarchy() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let services = agentz_core::Services::new(&repo_root, config);

    let result = match cli.command {
        Command::Spawn(args) => commands::session::spawn(&services, args, cli.json),
        Command::List => commands::session::list(&services, cli.json),
        Command::Get(args) => commands::session::get(&services, args, cli.json),
        Command::Cancel(args) => commands::session::cancel(&services, args, cli.json),
        Command::Delete(args) => commands::session::delete(&services, args, cli.json),
        Command::Send(args) => commands::session::send(&services, args, cli.json),
        Command::Approve(args) => commands::session::approve(&services, args),
        Command::Files(args) => commands::session::files(&services, args, cli.json),
        Command::Daemon(args) => commands::session::daemon(&services, args, cli.json),
        Command::Stats(args) => commands::stats::run(&services, args),
        Command::Debug(command) => commands::debug::run(&services, command, cli.json),
        Command::Task(command) => commands::task::run(&services, command, cli.json),
        Command::Commit(args) => commands::workflow::commit(&services, args, cli.json),
        Command::Merge(args) => commands::workflow::merge(&services, args, cli.json),
        Command::Revert(args) => commands::workflow::revert(&services, args, cli.json),
        Command::Archive(args) => commands::workflow::archive(&services, args, cli.json),
        Command::Cleanup(args) => commands::workflow::cleanup(&services, args, cli.json),
        Command::Sweep => commands::workflow::sweep(&services, cli.json),
        Command::Status(args) => commands::git::status(&services, args, cli.json),
        Command::Diff(args) => commands::git::diff(&services, args, cli.json),
        Command::Commits(args) => commands::git::commits(&services, args, cli.json),
        Command::Push(args) => commands::git::push(&services, args, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
