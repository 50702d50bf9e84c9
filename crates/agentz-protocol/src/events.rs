//! Tagged event schemas for the registry, per-session, and control streams.
//!
//! Every event carries a `"type"` discriminator and a `"schemaVersion"` field
//! (defaulted to 1 on decode for frames written before the field existed).
//! Decoding an unknown `type` or a newer schema version is a recoverable
//! error; a known `type` with missing required fields is a hard error and
//! the frame is treated as corrupt.

use serde::{Deserialize, Serialize};

use crate::metadata::AgentSessionMetadata;
use crate::types::{
    AgentType, ChunkKind, DebugRunId, SessionId, SessionStatus, TokenUsage,
};

/// Current schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

fn schema_version_default() -> u32 {
    SCHEMA_VERSION
}

/// An inline image a worker attached to an output chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    /// MIME type, e.g. `image/png`.
    pub media_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

/// One unit of worker output as written to a per-session stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutputChunk {
    pub kind: ChunkKind,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

impl AgentOutputChunk {
    pub fn new(kind: ChunkKind, content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: timestamp.into(),
            metadata: None,
            images: Vec::new(),
        }
    }
}

/// Session-lifecycle events carried by the single global registry stream.
///
/// The registry is the sole source of truth for session status, title, and
/// lifecycle timestamps. Each event carries the owning session id and a
/// monotonic server timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryEvent {
    #[serde(rename = "session_created", rename_all = "camelCase")]
    SessionCreated {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
        prompt: String,
        agent_type: AgentType,
        working_dir: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        task_path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_file: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_line: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        debug_run_id: Option<DebugRunId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        worktree_path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        worktree_branch: Option<String>,
    },

    #[serde(rename = "session_updated", rename_all = "camelCase")]
    SessionUpdated {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
        status: SessionStatus,
    },

    #[serde(rename = "session_completed", rename_all = "camelCase")]
    SessionCompleted {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<AgentSessionMetadata>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens_used: Option<TokenUsage>,
    },

    #[serde(rename = "session_failed", rename_all = "camelCase")]
    SessionFailed {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<AgentSessionMetadata>,
    },

    #[serde(rename = "session_cancelled", rename_all = "camelCase")]
    SessionCancelled {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
    },

    /// Tombstone: hides the session from every subsequent query. The
    /// per-session stream stays on disk but is semantically invisible.
    #[serde(rename = "session_deleted", rename_all = "camelCase")]
    SessionDeleted {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
    },
}

impl RegistryEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            RegistryEvent::SessionCreated { session_id, .. }
            | RegistryEvent::SessionUpdated { session_id, .. }
            | RegistryEvent::SessionCompleted { session_id, .. }
            | RegistryEvent::SessionFailed { session_id, .. }
            | RegistryEvent::SessionCancelled { session_id, .. }
            | RegistryEvent::SessionDeleted { session_id, .. } => session_id,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            RegistryEvent::SessionCreated { timestamp, .. }
            | RegistryEvent::SessionUpdated { timestamp, .. }
            | RegistryEvent::SessionCompleted { timestamp, .. }
            | RegistryEvent::SessionFailed { timestamp, .. }
            | RegistryEvent::SessionCancelled { timestamp, .. }
            | RegistryEvent::SessionDeleted { timestamp, .. } => timestamp,
        }
    }
}

/// Events carried by a per-session stream.
///
/// A per-session stream may only contain events whose session id matches the
/// stream identity; the ingester enforces this before appending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    #[serde(rename = "output", rename_all = "camelCase")]
    Output {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        chunk: AgentOutputChunk,
    },

    /// Worker-supplied opaque handle for its own resume mechanism.
    #[serde(rename = "cli_session_id", rename_all = "camelCase")]
    CliSessionId {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
        cli_session_id: String,
    },

    /// Opaque conversation snapshot the worker publishes so a later resume
    /// can restore its own state.
    #[serde(rename = "agent_state", rename_all = "camelCase")]
    AgentState {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
        state: serde_json::Value,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::Output { session_id, .. }
            | SessionEvent::CliSessionId { session_id, .. }
            | SessionEvent::AgentState { session_id, .. } => session_id,
        }
    }
}

/// Client-to-worker events carried by a session's control stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    #[serde(rename = "approval_response", rename_all = "camelCase")]
    ApprovalResponse {
        #[serde(default = "schema_version_default")]
        schema_version: u32,
        session_id: SessionId,
        timestamp: String,
        approved: bool,
    },
}

/// Why a frame failed to decode.
///
/// `UnknownEventType` and `UnsupportedVersion` are recoverable (skip the
/// frame, keep reading); `Corrupt` means the frame is treated as torn and
/// the read stops at its offset.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown event type '{type_name}'")]
    UnknownEventType { type_name: String },

    #[error("Unsupported schema version {version} (this build reads up to {SCHEMA_VERSION})")]
    UnsupportedVersion { version: u32 },

    #[error("Corrupt event frame: {message}")]
    Corrupt { message: String },
}

impl DecodeError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DecodeError::UnknownEventType { .. } | DecodeError::UnsupportedVersion { .. }
        )
    }
}

fn decode_tagged<T: serde::de::DeserializeOwned>(
    line: &str,
    known_types: &[&str],
) -> Result<T, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| DecodeError::Corrupt {
        message: format!("invalid JSON: {}", e),
    })?;

    let type_name = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| DecodeError::Corrupt {
            message: "missing 'type' discriminator".to_string(),
        })?
        .to_string();

    if !known_types.contains(&type_name.as_str()) {
        return Err(DecodeError::UnknownEventType {
            type_name: type_name.to_string(),
        });
    }

    if let Some(version) = value.get("schemaVersion").and_then(|v| v.as_u64()) {
        let version = version as u32;
        if version > SCHEMA_VERSION {
            return Err(DecodeError::UnsupportedVersion { version });
        }
    }

    serde_json::from_value(value).map_err(|e| DecodeError::Corrupt {
        message: format!("known type '{}' with invalid fields: {}", type_name, e),
    })
}

const REGISTRY_TYPES: &[&str] = &[
    "session_created",
    "session_updated",
    "session_completed",
    "session_failed",
    "session_cancelled",
    "session_deleted",
];

const SESSION_TYPES: &[&str] = &["output", "cli_session_id", "agent_state"];

const CONTROL_TYPES: &[&str] = &["approval_response"];

pub fn decode_registry_event(line: &str) -> Result<RegistryEvent, DecodeError> {
    decode_tagged(line, REGISTRY_TYPES)
}

pub fn decode_session_event(line: &str) -> Result<SessionEvent, DecodeError> {
    decode_tagged(line, SESSION_TYPES)
}

pub fn decode_control_event(line: &str) -> Result<ControlEvent, DecodeError> {
    decode_tagged(line, CONTROL_TYPES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created_event() -> RegistryEvent {
        RegistryEvent::SessionCreated {
            schema_version: SCHEMA_VERSION,
            session_id: SessionId::new("a1b2c3d4e5f6"),
            timestamp: "2026-03-01T12:00:00Z".to_string(),
            prompt: "list files".to_string(),
            agent_type: AgentType::Claude,
            working_dir: "/repo".to_string(),
            title: Some("List files".to_string()),
            task_path: None,
            source_file: None,
            source_line: None,
            debug_run_id: None,
            model: None,
            worktree_path: None,
            worktree_branch: None,
        }
    }

    #[test]
    fn test_registry_event_roundtrip() {
        let event = created_event();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"session_created\""));
        assert!(json.contains("\"sessionId\":\"a1b2c3d4e5f6\""));
        assert!(json.contains("\"agentType\":\"claude\""));
        assert!(!json.contains("taskPath"));

        let parsed = decode_registry_event(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_unknown_type_is_recoverable() {
        let line = r#"{"type":"session_renamed","sessionId":"a1b2c3d4e5f6"}"#;
        let err = decode_registry_event(line).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, DecodeError::UnknownEventType { ref type_name } if type_name == "session_renamed"));
    }

    #[test]
    fn test_known_type_missing_fields_is_corrupt() {
        // session_failed requires an error string
        let line = r#"{"type":"session_failed","sessionId":"a1b2c3d4e5f6","timestamp":"t"}"#;
        let err = decode_registry_event(line).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(matches!(err, DecodeError::Corrupt { .. }));
    }

    #[test]
    fn test_invalid_json_is_corrupt() {
        let err = decode_registry_event("{\"type\":\"session_crea").unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_missing_discriminator_is_corrupt() {
        let err = decode_registry_event(r#"{"sessionId":"a1b2c3d4e5f6"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Corrupt { .. }));
    }

    #[test]
    fn test_newer_schema_version_is_recoverable() {
        let line = r#"{"type":"session_cancelled","schemaVersion":99,"sessionId":"a1b2c3d4e5f6","timestamp":"t"}"#;
        let err = decode_registry_event(line).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnsupportedVersion { version: 99 }
        ));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_missing_schema_version_defaults_to_current() {
        let line = r#"{"type":"session_cancelled","sessionId":"a1b2c3d4e5f6","timestamp":"t"}"#;
        let event = decode_registry_event(line).unwrap();
        match event {
            RegistryEvent::SessionCancelled { schema_version, .. } => {
                assert_eq!(schema_version, SCHEMA_VERSION);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_session_event_output_roundtrip() {
        let event = SessionEvent::Output {
            schema_version: SCHEMA_VERSION,
            session_id: SessionId::new("a1b2c3d4e5f6"),
            chunk: AgentOutputChunk::new(ChunkKind::Text, "hello", "2026-03-01T12:00:00Z"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"output\""));
        assert!(json.contains("\"kind\":\"text\""));
        assert!(!json.contains("\"images\""));

        let parsed = decode_session_event(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_session_event_rejects_registry_type() {
        let json = serde_json::to_string(&created_event()).unwrap();
        let err = decode_session_event(&json).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventType { .. }));
    }

    #[test]
    fn test_control_event_roundtrip() {
        let event = ControlEvent::ApprovalResponse {
            schema_version: SCHEMA_VERSION,
            session_id: SessionId::new("a1b2c3d4e5f6"),
            timestamp: "2026-03-01T12:00:00Z".to_string(),
            approved: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"approved\":true"));
        let parsed = decode_control_event(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_completed_event_tokens_used() {
        let event = RegistryEvent::SessionCompleted {
            schema_version: SCHEMA_VERSION,
            session_id: SessionId::new("a1b2c3d4e5f6"),
            timestamp: "2026-03-01T12:00:00Z".to_string(),
            metadata: None,
            tokens_used: Some(TokenUsage {
                input: 5,
                output: 3,
            }),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"tokensUsed\":{\"input\":5,\"output\":3}"));
        let parsed = decode_registry_event(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
