pub mod codec;
mod events;
pub mod frame;
mod metadata;
mod types;

pub use events::{
    AgentOutputChunk, ControlEvent, DecodeError, ImageAttachment, RegistryEvent, SessionEvent,
    SCHEMA_VERSION, decode_control_event, decode_registry_event, decode_session_event,
};
pub use codec::CodecError;
pub use frame::{ChunkFrame, WorkerEvent};
pub use metadata::{
    AgentSessionMetadata, EditedFileInfo, FileOperation, MessageCounts, OutputMetrics,
    OutputMetricsEntry, TaskMerge, ToolClass, ToolStats, TurnSummary,
};
pub use types::{
    AgentType, BranchName, ChunkKind, DebugRunId, Nonce, QaStatus, SessionId, SessionStatus,
    SubtaskStatus, TokenUsage, UserId, is_valid_nonce, is_valid_session_id,
    supported_agents_string,
};
