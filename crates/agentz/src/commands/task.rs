//! Task document subcommands.

use clap::{Args, Subcommand, ValueEnum};

use agentz_core::Services;
use agentz_core::tasks::{SubtaskUpdate, TaskStore};
use agentz_protocol::SubtaskStatus;

use super::{CommandResult, print_json};

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Create a new task document under tasks/.
    Create(CreateArgs),
    /// Show a parsed task.
    Show(PathArg),
    /// Add an inline subtask.
    AddSubtask(AddSubtaskArgs),
    /// Update an inline subtask.
    UpdateSubtask(UpdateSubtaskArgs),
    /// Delete an inline subtask.
    DeleteSubtask(DeleteSubtaskArgs),
    /// Restore an archived task back under tasks/.
    Restore(PathArg),
    /// Turn selected body sections into subtasks.
    Split(SplitArgs),
    /// Fold split-off child task files back into this parent's subtasks.
    Migrate(PathArg),
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    pub title: String,

    #[arg(long, default_value = "")]
    pub body: String,
}

#[derive(Debug, Args)]
pub struct PathArg {
    pub task_path: String,
}

#[derive(Debug, Args)]
pub struct AddSubtaskArgs {
    pub task_path: String,
    pub title: String,

    /// Version the client last read; mismatch fails with the current one.
    #[arg(long)]
    pub expected_version: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SubtaskStatusArg {
    Pending,
    InProgress,
    Completed,
}

impl From<SubtaskStatusArg> for SubtaskStatus {
    fn from(arg: SubtaskStatusArg) -> Self {
        match arg {
            SubtaskStatusArg::Pending => SubtaskStatus::Pending,
            SubtaskStatusArg::InProgress => SubtaskStatus::InProgress,
            SubtaskStatusArg::Completed => SubtaskStatus::Completed,
        }
    }
}

#[derive(Debug, Args)]
pub struct UpdateSubtaskArgs {
    pub task_path: String,
    pub subtask_id: String,

    #[arg(long)]
    pub expected_version: u64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, value_enum)]
    pub status: Option<SubtaskStatusArg>,
}

#[derive(Debug, Args)]
pub struct DeleteSubtaskArgs {
    pub task_path: String,
    pub subtask_id: String,

    #[arg(long)]
    pub expected_version: u64,
}

#[derive(Debug, Args)]
pub struct SplitArgs {
    pub task_path: String,

    #[arg(long)]
    pub expected_version: u64,

    /// Section headings to split out.
    #[arg(long, required = true, num_args = 1..)]
    pub sections: Vec<String>,
}

pub fn run(services: &Services, command: TaskCommand, json: bool) -> CommandResult {
    let store = TaskStore::new(services.repo_root());
    match command {
        TaskCommand::Create(args) => {
            let path = store.create_task(&args.title, &args.body)?;
            if json {
                print_json(&serde_json::json!({"taskPath": path}))
            } else {
                println!("Created {}", path);
                Ok(())
            }
        }
        TaskCommand::Show(args) => {
            let task = store.read_task(&args.task_path)?;
            print_json(&task)
        }
        TaskCommand::AddSubtask(args) => {
            let id = store.add_subtask(&args.task_path, args.expected_version, &args.title)?;
            if json {
                print_json(&serde_json::json!({"subtaskId": id}))
            } else {
                println!("Added subtask {}", id);
                Ok(())
            }
        }
        TaskCommand::UpdateSubtask(args) => {
            let task = store.update_subtask(
                &args.task_path,
                args.expected_version,
                &args.subtask_id,
                SubtaskUpdate {
                    title: args.title,
                    status: args.status.map(Into::into),
                    items: None,
                },
            )?;
            if json {
                print_json(&task)
            } else {
                println!("Updated subtask {} (version {})", args.subtask_id, task.version());
                Ok(())
            }
        }
        TaskCommand::DeleteSubtask(args) => {
            store.delete_subtask(&args.task_path, args.expected_version, &args.subtask_id)?;
            println!("Deleted subtask {}", args.subtask_id);
            Ok(())
        }
        TaskCommand::Restore(args) => {
            let restored = store.restore_task(&args.task_path)?;
            println!("Restored to {}", restored);
            Ok(())
        }
        TaskCommand::Split(args) => {
            let task = store.split_sections(&args.task_path, args.expected_version, &args.sections)?;
            if json {
                print_json(&task)
            } else {
                println!("Split into {} subtasks", task.subtasks.len());
                Ok(())
            }
        }
        TaskCommand::Migrate(args) => {
            let year_month = chrono::Utc::now().format("%Y-%m").to_string();
            let task = store.migrate_split_from(&args.task_path, &year_month)?;
            println!("Parent now has {} subtasks", task.subtasks.len());
            Ok(())
        }
    }
}
