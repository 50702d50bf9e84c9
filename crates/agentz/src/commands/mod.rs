pub mod debug;
pub mod git;
pub mod session;
pub mod stats;
pub mod task;
pub mod workflow;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
