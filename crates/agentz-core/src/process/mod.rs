//! Detached worker process management.

mod errors;
mod liveness;
mod monitor;
mod record;

pub use errors::ProcessError;
pub use liveness::{get_process_info, is_process_running};
pub use monitor::{ProcessMonitor, SpawnParams};
pub use record::DaemonRecord;
