//! Session lifecycle subcommands.

use clap::Args;
use tracing::info;

use agentz_core::sessions;
use agentz_core::Services;
use agentz_protocol::{AgentType, SessionId};

use super::{CommandResult, print_json};

#[derive(Debug, Args)]
pub struct SpawnArgs {
    /// The task description handed to the worker.
    pub prompt: String,

    /// Agent implementation to launch.
    #[arg(long)]
    pub agent: Option<AgentType>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    /// Owning task document (repo-relative).
    #[arg(long)]
    pub task_path: Option<String>,

    /// Source file this session was started from (file-comment origin).
    #[arg(long)]
    pub source_file: Option<String>,

    #[arg(long)]
    pub source_line: Option<u32>,

    /// Rate-limit principal.
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Debug, Args)]
pub struct IdArg {
    pub session_id: String,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    pub session_id: String,
    pub message: String,

    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Debug, Args)]
pub struct ApproveArgs {
    pub session_id: String,

    /// Deny instead of approving.
    #[arg(long)]
    pub deny: bool,
}

pub fn spawn(services: &Services, args: SpawnArgs, json: bool) -> CommandResult {
    info!(event = "cli.spawn_started", agent = ?args.agent);

    let response = sessions::spawn_session(
        services,
        &sessions::SpawnRequest {
            prompt: args.prompt,
            agent_type: args.agent,
            model: args.model,
            title: args.title,
            task_path: args.task_path,
            source_file: args.source_file,
            source_line: args.source_line,
            user_id: args.user,
            ..Default::default()
        },
    )?;

    if json {
        print_json(&response)
    } else {
        println!(
            "Spawned session {} (pid {}, status {})",
            response.session_id, response.pid, response.status
        );
        Ok(())
    }
}

pub fn list(services: &Services, json: bool) -> CommandResult {
    let sessions = sessions::list_sessions(services)?;
    if json {
        return print_json(&sessions);
    }

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    println!("{:<14} {:<10} {:<18} {}", "SESSION", "AGENT", "STATUS", "TITLE");
    for session in sessions {
        println!(
            "{:<14} {:<10} {:<18} {}",
            session.id,
            session.agent_type,
            session.status,
            session.title.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub fn get(services: &Services, args: GetArgs, json: bool) -> CommandResult {
    let session_id = SessionId::new(&args.session_id);
    let found = if args.metadata {
        sessions::get_session_with_metadata(services, &session_id)?
            .map(|with| serde_json::to_value(with))
            .transpose()?
    } else {
        sessions::get_session(services, &session_id)?
            .map(|session| serde_json::to_value(session))
            .transpose()?
    };

    match found {
        Some(value) if json => print_json(&value),
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => {
            eprintln!("Session '{}' not found", args.session_id);
            std::process::exit(1);
        }
    }
}

#[derive(Debug, Args)]
pub struct GetArgs {
    pub session_id: String,

    /// Include derived metadata (tool stats, output metrics, duration).
    #[arg(long)]
    pub metadata: bool,
}

pub fn cancel(services: &Services, args: IdArg, json: bool) -> CommandResult {
    let outcome = sessions::cancel_session(services, &SessionId::new(&args.session_id))?;
    if json {
        print_json(&outcome)
    } else {
        if outcome.success {
            println!("Cancelled session {}", args.session_id);
        } else {
            println!(
                "Worker for {} was already gone; cancellation recorded",
                args.session_id
            );
        }
        Ok(())
    }
}

pub fn delete(services: &Services, args: IdArg, json: bool) -> CommandResult {
    sessions::delete_session(services, &SessionId::new(&args.session_id))?;
    if json {
        print_json(&serde_json::json!({"success": true}))
    } else {
        println!("Deleted session {}", args.session_id);
        Ok(())
    }
}

pub fn send(services: &Services, args: SendArgs, json: bool) -> CommandResult {
    let pid = sessions::send_message(
        services,
        &sessions::SendMessageRequest {
            session_id: SessionId::new(&args.session_id),
            message: args.message,
            attachments: Vec::new(),
            user_id: args.user,
            estimated_tokens: None,
        },
    )?;
    if json {
        print_json(&serde_json::json!({"sessionId": args.session_id, "pid": pid}))
    } else {
        println!("Resumed session {} (pid {})", args.session_id, pid);
        Ok(())
    }
}

pub fn approve(services: &Services, args: ApproveArgs) -> CommandResult {
    let approved = !args.deny;
    sessions::approve(services, &SessionId::new(&args.session_id), approved)?;
    println!(
        "{} session {}",
        if approved { "Approved" } else { "Denied" },
        args.session_id
    );
    Ok(())
}

pub fn files(services: &Services, args: IdArg, json: bool) -> CommandResult {
    let files = sessions::get_changed_files(services, &SessionId::new(&args.session_id))?;
    if json {
        return print_json(&files);
    }
    if files.is_empty() {
        println!("No changed files.");
        return Ok(());
    }
    for file in files {
        println!("{:<8} {:<24} {}", format!("{:?}", file.operation).to_lowercase(), file.tool_used, file.path);
    }
    Ok(())
}

pub fn daemon(services: &Services, args: IdArg, json: bool) -> CommandResult {
    let status = sessions::daemon_status(services, &SessionId::new(&args.session_id))?;
    if json {
        return print_json(&status);
    }
    match status {
        sessions::DaemonStatus::Alive { pid, started_at } => {
            println!("alive (pid {}, started {})", pid, started_at);
        }
        sessions::DaemonStatus::WorkerLost => {
            println!("worker lost: pid is gone but no terminal event was recorded");
        }
        sessions::DaemonStatus::NotRunning => println!("not running"),
    }
    Ok(())
}
