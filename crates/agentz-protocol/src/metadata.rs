use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ChunkKind, SessionId};

/// How a tool touched a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Create,
    Edit,
    Delete,
}

/// Coarse classification of a tool by what it does to the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolClass {
    Read,
    Write,
    Execute,
    Other,
}

impl ToolClass {
    /// Classify a tool by substring test on its lower-cased name.
    ///
    /// Write wins over read so names like `read_then_write` count as writes,
    /// matching the changed-files derivation.
    pub fn classify(tool_name: &str) -> Self {
        let lower = tool_name.to_lowercase();
        if ["write", "edit", "create", "delete", "remove", "patch"]
            .iter()
            .any(|m| lower.contains(m))
        {
            ToolClass::Write
        } else if ["read", "cat", "view", "glob", "grep", "search", "list"]
            .iter()
            .any(|m| lower.contains(m))
        {
            ToolClass::Read
        } else if ["bash", "exec", "run", "shell", "command"]
            .iter()
            .any(|m| lower.contains(m))
        {
            ToolClass::Execute
        } else {
            ToolClass::Other
        }
    }
}

/// One file a session touched, derived from its `tool_use` chunks or carried
/// by its terminal registry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditedFileInfo {
    /// Repo-relative path.
    pub path: String,
    pub operation: FileOperation,
    pub tool_used: String,
    pub timestamp: String,
}

/// Tool invocation counts, by concrete name and by class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    #[serde(default)]
    pub by_name: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_class: BTreeMap<ToolClass, u64>,
}

impl ToolStats {
    pub fn record(&mut self, tool_name: &str) {
        *self.by_name.entry(tool_name.to_string()).or_insert(0) += 1;
        *self
            .by_class
            .entry(ToolClass::classify(tool_name))
            .or_insert(0) += 1;
    }

    pub fn total_calls(&self) -> u64 {
        self.by_name.values().sum()
    }
}

/// Character and estimated-token volume for one chunk class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetricsEntry {
    pub chars: u64,
    /// chars / 4, the rough heuristic used everywhere tokens are estimated.
    pub estimated_tokens: u64,
}

/// Output volume per chunk class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetrics {
    #[serde(default)]
    pub by_kind: BTreeMap<String, OutputMetricsEntry>,
}

impl OutputMetrics {
    pub fn record(&mut self, kind: ChunkKind, content_len: usize) {
        let entry = self.by_kind.entry(kind.as_str().to_string()).or_default();
        entry.chars += content_len as u64;
        entry.estimated_tokens = entry.chars / 4;
    }

    pub fn total_chars(&self) -> u64 {
        self.by_kind.values().map(|e| e.chars).sum()
    }

    pub fn total_estimated_tokens(&self) -> u64 {
        self.by_kind.values().map(|e| e.estimated_tokens).sum()
    }
}

/// Message counts by chunk kind plus the overall total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCounts {
    pub total: u64,
    #[serde(default)]
    pub by_kind: BTreeMap<String, u64>,
}

/// One entry in the per-turn digest carried by terminal metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSummary {
    pub index: u32,
    pub kind: String,
    /// First line of the turn's content, truncated for display.
    pub preview: String,
}

/// Derived session metrics attached to terminal registry events.
///
/// For a running session the same shape is computed live from the output
/// stream; once the session is terminal, the copy carried by the
/// completion/failure event wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSessionMetadata {
    #[serde(default)]
    pub edited_files: Vec<EditedFileInfo>,
    #[serde(default)]
    pub tool_stats: ToolStats,
    #[serde(default)]
    pub output_metrics: OutputMetrics,
    /// Fraction of the context window in use, 0.0–1.0, if the worker reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window_utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub message_counts: MessageCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub turn_summaries: Vec<TurnSummary>,
}

/// A merge of a session's worktree branch recorded on its owning task.
///
/// Either live (no revert) or paired with the commit hash that reverted it;
/// a merge record is never left in any other state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMerge {
    pub session_id: SessionId,
    pub commit_hash: String,
    pub merged_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverted_by: Option<String>,
}
