use serde::{Deserialize, Serialize};

/// Generate a newtype wrapper around `String` with standard trait impls.
///
/// Each generated type gets: `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`,
/// `Serialize`/`Deserialize` (transparent), `Display`, `Deref<Target=str>`,
/// `AsRef<str>`, `Borrow<str>`, `From<String>`, `From<&str>`.
macro_rules! newtype_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn into_inner(self) -> String {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

newtype_string! {
    /// Unique identifier for an agent session: 12 lowercase hex characters
    /// (e.g., `"a1b2c3d4e5f6"`).
    SessionId
}

newtype_string! {
    /// One-time secret handed to a worker at spawn: 32 lowercase hex characters.
    ///
    /// Authenticates the worker's writes to the chunk ingester. Never reused
    /// across sessions or resumes.
    Nonce
}

newtype_string! {
    /// Groups parallel debug sibling sessions spawned by one `debug_with_agents` call.
    DebugRunId
}

newtype_string! {
    /// A git branch name (e.g., `"agentz/session-a1b2c3d4e5f6"` or `"main"`).
    BranchName
}

newtype_string! {
    /// Rate-limit principal. Opaque to the control plane.
    UserId
}

/// True if `s` is a well-formed session id: exactly 12 lowercase hex chars.
pub fn is_valid_session_id(s: &str) -> bool {
    s.len() == 12 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// True if `s` is a well-formed daemon nonce: exactly 32 lowercase hex chars.
pub fn is_valid_nonce(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// The closed set of worker implementations the control plane can launch.
///
/// Wire names are part of the external contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Claude,
    Codex,
    Opencode,
    Cerebras,
    Gemini,
    Mcporter,
}

impl AgentType {
    pub const ALL: [AgentType; 6] = [
        AgentType::Claude,
        AgentType::Codex,
        AgentType::Opencode,
        AgentType::Cerebras,
        AgentType::Gemini,
        AgentType::Mcporter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Claude => "claude",
            AgentType::Codex => "codex",
            AgentType::Opencode => "opencode",
            AgentType::Cerebras => "cerebras",
            AgentType::Gemini => "gemini",
            AgentType::Mcporter => "mcporter",
        }
    }
}

impl Default for AgentType {
    fn default() -> Self {
        AgentType::Claude
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(AgentType::Claude),
            "codex" => Ok(AgentType::Codex),
            "opencode" => Ok(AgentType::Opencode),
            "cerebras" => Ok(AgentType::Cerebras),
            "gemini" => Ok(AgentType::Gemini),
            "mcporter" => Ok(AgentType::Mcporter),
            other => Err(format!(
                "Unknown agent type '{}'. Supported: {}",
                other,
                supported_agents_string()
            )),
        }
    }
}

/// Comma-separated list of supported agent wire names, for error messages.
pub fn supported_agents_string() -> String {
    AgentType::ALL
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Session lifecycle status as carried in registry events.
///
/// Terminal states are `completed`, `failed`, and `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Working,
    WaitingApproval,
    WaitingInput,
    Idle,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Working => "working",
            SessionStatus::WaitingApproval => "waiting_approval",
            SessionStatus::WaitingInput => "waiting_input",
            SessionStatus::Idle => "idle",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single chunk in a session's output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Text,
    ToolUse,
    ToolResult,
    System,
    Error,
    Thinking,
    UserMessage,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::ToolUse => "tool_use",
            ChunkKind::ToolResult => "tool_result",
            ChunkKind::System => "system",
            ChunkKind::Error => "error",
            ChunkKind::Thinking => "thinking",
            ChunkKind::UserMessage => "user_message",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task QA lifecycle marker: `pending` after a merge to main,
/// `pass` or `fail` after user review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaStatus {
    Pending,
    Pass,
    Fail,
}

/// Status of an inline subtask inside a task document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// Input/output token counts as last reported by a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}
