//! Derived views over a session's output stream.
//!
//! Changed files for a running session come from its `tool_use` chunks;
//! once the session is terminal, the `editedFiles` list carried by the
//! completion/failure event wins (falling back to the live derivation when
//! that list is empty).

use agentz_protocol::{
    AgentOutputChunk, AgentSessionMetadata, ChunkKind, EditedFileInfo, FileOperation,
    MessageCounts, OutputMetrics, ToolStats, TurnSummary,
};

use crate::reconstruct::Session;

/// JSON keys recognised as file paths in tool_use payloads.
const FILE_PATH_KEYS: [&str; 4] = ["path", "file_path", "file", "notebook_path"];

const PREVIEW_LEN: usize = 80;

/// Parse one `tool_use` chunk into an edited-file record, if its payload
/// names a file and its tool is of create/edit/delete class.
///
/// The tool name test is a substring match on the lower-cased name, so
/// `Write`, `str_replace_edit`, and `NotebookEdit` all count.
pub fn parse_tool_use_file_edit(chunk: &AgentOutputChunk) -> Option<EditedFileInfo> {
    if chunk.kind != ChunkKind::ToolUse {
        return None;
    }

    let payload: serde_json::Value = serde_json::from_str(&chunk.content).ok()?;
    let tool_name = payload.get("tool")?.as_str()?;

    let operation = classify_file_operation(tool_name)?;

    let input = payload.get("input").unwrap_or(&payload);
    let path = FILE_PATH_KEYS
        .iter()
        .find_map(|key| input.get(*key).and_then(|v| v.as_str()))?;

    Some(EditedFileInfo {
        path: path.to_string(),
        operation,
        tool_used: tool_name.to_string(),
        timestamp: chunk.timestamp.clone(),
    })
}

fn classify_file_operation(tool_name: &str) -> Option<FileOperation> {
    let lower = tool_name.to_lowercase();
    if lower.contains("delete") || lower.contains("remove") {
        Some(FileOperation::Delete)
    } else if lower.contains("create") {
        Some(FileOperation::Create)
    } else if lower.contains("write") || lower.contains("edit") || lower.contains("patch") {
        Some(FileOperation::Edit)
    } else {
        None
    }
}

/// Changed files for a reconstructed session (P4 semantics).
pub fn derive_changed_files(session: &Session) -> Vec<EditedFileInfo> {
    if session.is_terminal()
        && let Some(metadata) = &session.metadata
        && !metadata.edited_files.is_empty()
    {
        return metadata.edited_files.clone();
    }
    session
        .output
        .iter()
        .filter_map(parse_tool_use_file_edit)
        .collect()
}

/// Compute the live metadata shape for a session from its output stream.
///
/// The same shape a worker attaches to its terminal event, derived
/// control-plane-side so running sessions can be inspected.
pub fn derive_live_metadata(session: &Session) -> AgentSessionMetadata {
    let mut tool_stats = ToolStats::default();
    let mut output_metrics = OutputMetrics::default();
    let mut message_counts = MessageCounts::default();
    let mut turn_summaries = Vec::new();

    for (index, chunk) in session.output.iter().enumerate() {
        output_metrics.record(chunk.kind, chunk.content.len());
        message_counts.total += 1;
        *message_counts
            .by_kind
            .entry(chunk.kind.as_str().to_string())
            .or_insert(0) += 1;

        if chunk.kind == ChunkKind::ToolUse
            && let Ok(payload) = serde_json::from_str::<serde_json::Value>(&chunk.content)
            && let Some(tool_name) = payload.get("tool").and_then(|t| t.as_str())
        {
            tool_stats.record(tool_name);
        }

        if matches!(chunk.kind, ChunkKind::Text | ChunkKind::UserMessage) {
            turn_summaries.push(TurnSummary {
                index: index as u32,
                kind: chunk.kind.as_str().to_string(),
                preview: preview(&chunk.content),
            });
        }
    }

    let duration_ms = session.completed_at.as_deref().and_then(|completed| {
        let started = chrono::DateTime::parse_from_rfc3339(&session.started_at).ok()?;
        let completed = chrono::DateTime::parse_from_rfc3339(completed).ok()?;
        u64::try_from((completed - started).num_milliseconds()).ok()
    });

    AgentSessionMetadata {
        edited_files: session
            .output
            .iter()
            .filter_map(parse_tool_use_file_edit)
            .collect(),
        tool_stats,
        output_metrics,
        context_window_utilization: None,
        duration_ms,
        message_counts,
        turn_summaries,
    }
}

fn preview(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("");
    if first_line.len() <= PREVIEW_LEN {
        first_line.to_string()
    } else {
        let mut cut = PREVIEW_LEN;
        while !first_line.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &first_line[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentz_protocol::{AgentType, SessionId, SessionStatus};

    fn tool_use(content: &str) -> AgentOutputChunk {
        AgentOutputChunk::new(ChunkKind::ToolUse, content, "t")
    }

    fn session_with_output(output: Vec<AgentOutputChunk>) -> Session {
        Session {
            id: SessionId::new("a1b2c3d4e5f6"),
            prompt: "p".to_string(),
            title: None,
            status: SessionStatus::Working,
            working_dir: "/repo".to_string(),
            worktree_path: None,
            worktree_branch: None,
            agent_type: AgentType::Claude,
            model: None,
            started_at: "2026-03-01T12:00:00Z".to_string(),
            completed_at: None,
            tokens_used: None,
            cli_session_id: None,
            resume_history: Vec::new(),
            task_path: None,
            source_file: None,
            source_line: None,
            debug_run_id: None,
            error: None,
            metadata: None,
            resumable: true,
            output,
            agent_state: None,
        }
    }

    #[test]
    fn test_parse_tool_use_recognises_path_keys() {
        for key in ["path", "file_path", "file", "notebook_path"] {
            let content = format!(r#"{{"tool":"Write","input":{{"{}":"src/x.rs"}}}}"#, key);
            let info = parse_tool_use_file_edit(&tool_use(&content)).unwrap();
            assert_eq!(info.path, "src/x.rs");
            assert_eq!(info.operation, FileOperation::Edit);
            assert_eq!(info.tool_used, "Write");
        }
    }

    #[test]
    fn test_parse_tool_use_classifies_operations() {
        let create = r#"{"tool":"create_file","input":{"path":"a.rs"}}"#;
        let edit = r#"{"tool":"Edit","input":{"path":"a.rs"}}"#;
        let delete = r#"{"tool":"delete_file","input":{"path":"a.rs"}}"#;

        assert_eq!(
            parse_tool_use_file_edit(&tool_use(create)).unwrap().operation,
            FileOperation::Create
        );
        assert_eq!(
            parse_tool_use_file_edit(&tool_use(edit)).unwrap().operation,
            FileOperation::Edit
        );
        assert_eq!(
            parse_tool_use_file_edit(&tool_use(delete)).unwrap().operation,
            FileOperation::Delete
        );
    }

    #[test]
    fn test_parse_tool_use_ignores_read_tools() {
        let read = r#"{"tool":"Read","input":{"path":"a.rs"}}"#;
        assert!(parse_tool_use_file_edit(&tool_use(read)).is_none());
    }

    #[test]
    fn test_parse_tool_use_ignores_non_tool_chunks() {
        let chunk = AgentOutputChunk::new(ChunkKind::Text, r#"{"tool":"Write"}"#, "t");
        assert!(parse_tool_use_file_edit(&chunk).is_none());
    }

    #[test]
    fn test_parse_tool_use_ignores_pathless_payloads() {
        let chunk = tool_use(r#"{"tool":"Write","input":{"content":"x"}}"#);
        assert!(parse_tool_use_file_edit(&chunk).is_none());
    }

    #[test]
    fn test_changed_files_live_derivation() {
        let session = session_with_output(vec![
            tool_use(r#"{"tool":"Write","input":{"file_path":"src/a.rs"}}"#),
            tool_use(r#"{"tool":"Read","input":{"path":"src/b.rs"}}"#),
            tool_use(r#"{"tool":"delete_file","input":{"path":"src/c.rs"}}"#),
        ]);
        let files = derive_changed_files(&session);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "src/a.rs");
        assert_eq!(files[1].path, "src/c.rs");
    }

    #[test]
    fn test_changed_files_terminal_metadata_wins() {
        let mut session = session_with_output(vec![tool_use(
            r#"{"tool":"Write","input":{"path":"live.rs"}}"#,
        )]);
        session.status = SessionStatus::Completed;
        session.metadata = Some(AgentSessionMetadata {
            edited_files: vec![EditedFileInfo {
                path: "authoritative.rs".to_string(),
                operation: FileOperation::Edit,
                tool_used: "Write".to_string(),
                timestamp: "t".to_string(),
            }],
            ..Default::default()
        });

        let files = derive_changed_files(&session);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "authoritative.rs");
    }

    #[test]
    fn test_changed_files_terminal_empty_metadata_falls_back() {
        let mut session = session_with_output(vec![tool_use(
            r#"{"tool":"Write","input":{"path":"live.rs"}}"#,
        )]);
        session.status = SessionStatus::Failed;
        session.metadata = Some(AgentSessionMetadata::default());

        let files = derive_changed_files(&session);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "live.rs");
    }

    #[test]
    fn test_live_metadata_counts() {
        let mut output = vec![
            AgentOutputChunk::new(ChunkKind::Text, "hello world", "t"),
            tool_use(r#"{"tool":"Bash","input":{"command":"ls"}}"#),
            tool_use(r#"{"tool":"Write","input":{"path":"a.rs"}}"#),
        ];
        output.push(AgentOutputChunk::new(ChunkKind::Thinking, "hmm", "t"));
        let session = session_with_output(output);

        let metadata = derive_live_metadata(&session);
        assert_eq!(metadata.message_counts.total, 4);
        assert_eq!(metadata.message_counts.by_kind.get("tool_use"), Some(&2));
        assert_eq!(metadata.tool_stats.total_calls(), 2);
        assert_eq!(metadata.edited_files.len(), 1);
        assert_eq!(metadata.turn_summaries.len(), 1);
        assert_eq!(metadata.turn_summaries[0].preview, "hello world");
        assert!(metadata.output_metrics.by_kind.contains_key("text"));
        assert!(metadata.duration_ms.is_none());
    }

    #[test]
    fn test_live_metadata_duration() {
        let mut session = session_with_output(vec![]);
        session.completed_at = Some("2026-03-01T12:00:05Z".to_string());
        let metadata = derive_live_metadata(&session);
        assert_eq!(metadata.duration_ms, Some(5_000));
    }
}
