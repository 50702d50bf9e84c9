//! Multi-agent debug run subcommands.

use clap::{Args, Subcommand};

use agentz_core::Services;
use agentz_core::sessions::{
    DebugRunRequest, debug_with_agents, get_debug_run_status, orchestrate_debug_run,
};
use agentz_protocol::{AgentType, DebugRunId};

use super::{CommandResult, print_json};

#[derive(Debug, Subcommand)]
pub enum DebugCommand {
    /// Spawn one debug session per agent against a fresh task file.
    Start(StartArgs),
    /// Per-session status of a debug run.
    Status(RunIdArg),
    /// Spawn (or return) the synthesis session for a terminal debug run.
    Orchestrate(OrchestrateArgs),
}

#[derive(Debug, Args)]
pub struct StartArgs {
    pub title: String,
    pub prompt: String,

    /// Agents to run in parallel.
    #[arg(long, required = true, num_args = 1..)]
    pub agents: Vec<AgentType>,

    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunIdArg {
    pub debug_run_id: String,
}

#[derive(Debug, Args)]
pub struct OrchestrateArgs {
    pub debug_run_id: String,
    pub task_path: String,

    /// Spawn a fresh orchestrator even if one is already recorded.
    #[arg(long)]
    pub force: bool,
}

pub fn run(services: &Services, command: DebugCommand, json: bool) -> CommandResult {
    match command {
        DebugCommand::Start(args) => {
            let response = debug_with_agents(
                services,
                &DebugRunRequest {
                    title: args.title,
                    prompt: args.prompt,
                    agents: args.agents,
                    user_id: args.user,
                },
            )?;
            if json {
                print_json(&response)
            } else {
                println!(
                    "Debug run {} with {} sessions (task {})",
                    response.debug_run_id,
                    response.session_ids.len(),
                    response.task_path
                );
                Ok(())
            }
        }
        DebugCommand::Status(args) => {
            let status = get_debug_run_status(services, &DebugRunId::new(&args.debug_run_id))?;
            if json {
                print_json(&status)
            } else {
                for session in &status.sessions {
                    println!(
                        "{:<14} {:<18} {}",
                        session.session_id,
                        session.status,
                        session.title.as_deref().unwrap_or("-"),
                    );
                }
                println!(
                    "all terminal: {}",
                    if status.all_terminal { "yes" } else { "no" }
                );
                Ok(())
            }
        }
        DebugCommand::Orchestrate(args) => {
            let outcome = orchestrate_debug_run(
                services,
                &DebugRunId::new(&args.debug_run_id),
                &args.task_path,
                args.force,
            )?;
            if json {
                print_json(&outcome)
            } else {
                println!(
                    "Orchestrator session {} ({})",
                    outcome.session_id,
                    if outcome.is_new { "new" } else { "existing" }
                );
                Ok(())
            }
        }
    }
}
