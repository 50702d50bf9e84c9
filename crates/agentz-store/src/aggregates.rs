//! Aggregate read views folded from the registry.
//!
//! Each endpoint folds the registry once and projects. The registry is
//! append-only and typically small, so there is no in-memory index; every
//! query re-reads the durable prefix.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use agentz_protocol::{EditedFileInfo, RegistryEvent, SessionId, SessionStatus, ToolStats};

use crate::derive::{derive_changed_files, derive_live_metadata};
use crate::errors::StoreError;
use crate::reconstruct::{Session, reconstruct_session};
use crate::registry::EventStore;

/// Enumerate non-deleted sessions, newest first.
pub fn list_sessions(store: &EventStore) -> Result<Vec<Session>, StoreError> {
    let registry = store.read_registry()?;
    let mut ids: Vec<SessionId> = Vec::new();
    for event in &registry {
        if matches!(event, RegistryEvent::SessionCreated { .. })
            && !ids.contains(event.session_id())
        {
            ids.push(event.session_id().clone());
        }
    }

    let mut sessions = Vec::with_capacity(ids.len());
    for id in ids {
        let session_events = store.read_session(&id)?;
        if let Some(session) = reconstruct_session(&registry, &session_events, &id) {
            sessions.push(session);
        }
    }
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(sessions)
}

/// Reconstructed session for one id, or `None` when absent or tombstoned.
pub fn get_session(store: &EventStore, id: &SessionId) -> Result<Option<Session>, StoreError> {
    let registry = store.read_registry()?;
    let session_events = store.read_session(id)?;
    Ok(reconstruct_session(&registry, &session_events, id))
}

/// Sessions whose status is non-terminal.
pub fn active_sessions(store: &EventStore) -> Result<Vec<Session>, StoreError> {
    Ok(list_sessions(store)?
        .into_iter()
        .filter(Session::is_active)
        .collect())
}

/// Top-line counters across all non-deleted sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub by_status: BTreeMap<String, usize>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

pub fn overview(store: &EventStore) -> Result<Overview, StoreError> {
    let sessions = list_sessions(store)?;
    let mut view = Overview {
        total_sessions: sessions.len(),
        ..Default::default()
    };
    for session in &sessions {
        if session.is_active() {
            view.active_sessions += 1;
        }
        *view
            .by_status
            .entry(session.status.as_str().to_string())
            .or_insert(0) += 1;
        if let Some(tokens) = session.tokens_used {
            view.total_input_tokens += tokens.input;
            view.total_output_tokens += tokens.output;
        }
    }
    Ok(view)
}

/// Merged tool-call counters across all non-deleted sessions.
pub fn tool_stats(store: &EventStore) -> Result<ToolStats, StoreError> {
    let sessions = list_sessions(store)?;
    let mut merged = ToolStats::default();
    for session in &sessions {
        let stats = match &session.metadata {
            Some(metadata) if session.is_terminal() => metadata.tool_stats.clone(),
            _ => derive_live_metadata(session).tool_stats,
        };
        for (name, count) in stats.by_name {
            *merged.by_name.entry(name).or_insert(0) += count;
        }
        for (class, count) in stats.by_class {
            *merged.by_class.entry(class).or_insert(0) += count;
        }
    }
    Ok(merged)
}

/// One path's edit count across terminal sessions, for the hot-files ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotFile {
    pub path: String,
    pub edits: u64,
    pub sessions: u64,
}

/// Rank edits per path across all non-deleted terminal sessions.
pub fn hot_files(store: &EventStore, limit: usize) -> Result<Vec<HotFile>, StoreError> {
    let sessions = list_sessions(store)?;
    let mut per_path: BTreeMap<String, (u64, u64)> = BTreeMap::new();

    for session in sessions.iter().filter(|s| s.is_terminal()) {
        let files = derive_changed_files(session);
        let mut seen_in_session: Vec<&str> = Vec::new();
        for file in &files {
            let entry = per_path.entry(file.path.clone()).or_insert((0, 0));
            entry.0 += 1;
            if !seen_in_session.contains(&file.path.as_str()) {
                entry.1 += 1;
                seen_in_session.push(&file.path);
            }
        }
    }

    let mut ranked: Vec<HotFile> = per_path
        .into_iter()
        .map(|(path, (edits, sessions))| HotFile {
            path,
            edits,
            sessions,
        })
        .collect();
    ranked.sort_by(|a, b| b.edits.cmp(&a.edits).then_with(|| a.path.cmp(&b.path)));
    ranked.truncate(limit);
    Ok(ranked)
}

/// Every file change across non-deleted sessions, with its owning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub info: EditedFileInfo,
}

pub fn file_changes(store: &EventStore) -> Result<Vec<FileChange>, StoreError> {
    let sessions = list_sessions(store)?;
    let mut changes = Vec::new();
    for session in &sessions {
        for info in derive_changed_files(session) {
            changes.push(FileChange {
                session_id: session.id.clone(),
                info,
            });
        }
    }
    Ok(changes)
}

/// One tool invocation with its session and parsed target, for drill-down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallDetail {
    pub session_id: SessionId,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub timestamp: String,
}

pub fn tool_call_details(store: &EventStore) -> Result<Vec<ToolCallDetail>, StoreError> {
    let sessions = list_sessions(store)?;
    let mut details = Vec::new();
    for session in &sessions {
        for chunk in &session.output {
            if chunk.kind != agentz_protocol::ChunkKind::ToolUse {
                continue;
            }
            let Ok(payload) = serde_json::from_str::<serde_json::Value>(&chunk.content) else {
                continue;
            };
            let Some(tool) = payload.get("tool").and_then(|t| t.as_str()) else {
                continue;
            };
            let input = payload.get("input").unwrap_or(&payload);
            let path = ["path", "file_path", "file", "notebook_path"]
                .iter()
                .find_map(|key| input.get(*key).and_then(|v| v.as_str()))
                .map(str::to_string);
            details.push(ToolCallDetail {
                session_id: session.id.clone(),
                tool: tool.to_string(),
                path,
                timestamp: chunk.timestamp.clone(),
            });
        }
    }
    Ok(details)
}

/// Per-agent-type session statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub by_agent: BTreeMap<String, usize>,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_duration_ms: Option<u64>,
}

pub fn session_stats(store: &EventStore) -> Result<SessionStats, StoreError> {
    let sessions = list_sessions(store)?;
    let mut stats = SessionStats::default();
    let mut durations: Vec<u64> = Vec::new();

    for session in &sessions {
        *stats
            .by_agent
            .entry(session.agent_type.as_str().to_string())
            .or_insert(0) += 1;
        match session.status {
            SessionStatus::Completed => stats.completed += 1,
            SessionStatus::Failed => stats.failed += 1,
            SessionStatus::Cancelled => stats.cancelled += 1,
            _ => {}
        }
        if let Some(duration) = derive_live_metadata(session).duration_ms {
            durations.push(duration);
        }
    }

    if !durations.is_empty() {
        stats.avg_duration_ms = Some(durations.iter().sum::<u64>() / durations.len() as u64);
    }
    Ok(stats)
}

/// Session counts grouped by owning task path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    pub by_task: BTreeMap<String, TaskMetricsEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetricsEntry {
    pub sessions: usize,
    pub completed: usize,
    pub failed: usize,
    pub files_touched: usize,
}

pub fn task_metrics(store: &EventStore) -> Result<TaskMetrics, StoreError> {
    let sessions = list_sessions(store)?;
    let mut metrics = TaskMetrics::default();
    for session in &sessions {
        let Some(task_path) = &session.task_path else {
            continue;
        };
        let entry = metrics.by_task.entry(task_path.clone()).or_default();
        entry.sessions += 1;
        match session.status {
            SessionStatus::Completed => entry.completed += 1,
            SessionStatus::Failed => entry.failed += 1,
            _ => {}
        }
        entry.files_touched += derive_changed_files(session).len();
    }
    Ok(metrics)
}

/// Sessions grouped by local-timezone calendar day of their start.
pub fn daily_buckets(store: &EventStore) -> Result<BTreeMap<String, usize>, StoreError> {
    let sessions = list_sessions(store)?;
    let mut buckets: BTreeMap<String, usize> = BTreeMap::new();
    for session in &sessions {
        let Ok(started) = DateTime::parse_from_rfc3339(&session.started_at) else {
            continue;
        };
        let day = started
            .with_timezone(&Local)
            .format("%Y-%m-%d")
            .to_string();
        *buckets.entry(day).or_insert(0) += 1;
    }
    Ok(buckets)
}
