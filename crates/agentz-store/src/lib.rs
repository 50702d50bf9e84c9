pub mod aggregates;
mod derive;
mod errors;
mod reconstruct;
mod registry;
mod stream;
mod sweep;

pub use derive::{derive_changed_files, derive_live_metadata, parse_tool_use_file_edit};
pub use errors::StoreError;
pub use reconstruct::{Session, reconstruct_session};
pub use registry::EventStore;
pub use stream::{ReadOutcome, StreamStore};
pub use sweep::{SweepOutcome, retention_sweep};
