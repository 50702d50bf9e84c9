//! Task document codec.
//!
//! Layout on disk:
//!
//! ```markdown
//! ---
//! version = 3
//! qaStatus = "pending"
//! ---
//!
//! # Task title
//!
//! Body markdown.
//!
//! ## Subtasks
//!
//! ### [in_progress] Wire the parser (id: st-1a2b3c)
//! - [x] happy path
//! - [ ] torn frames
//! ```
//!
//! Front matter is TOML between `---` fences; the subtask heading carries
//! status and id inline so the section survives hand-editing.

use agentz_protocol::SubtaskStatus;

use crate::tasks::errors::TaskError;
use crate::tasks::types::{ChecklistItem, FrontMatter, Subtask, Task};

const FENCE: &str = "---";
const SUBTASKS_HEADING: &str = "## Subtasks";

pub fn parse_task(path: &str, content: &str) -> Result<Task, TaskError> {
    let (front_matter, rest) = split_front_matter(path, content)?;

    let mut title = String::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut subtask_lines: Vec<&str> = Vec::new();
    let mut in_subtasks = false;
    let mut seen_title = false;

    for line in rest.lines() {
        if !seen_title {
            if let Some(heading) = line.strip_prefix("# ") {
                title = heading.trim().to_string();
                seen_title = true;
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
        }
        if line.trim() == SUBTASKS_HEADING {
            in_subtasks = true;
            continue;
        }
        if in_subtasks {
            subtask_lines.push(line);
        } else if seen_title {
            body_lines.push(line);
        }
    }

    if title.is_empty() {
        return Err(TaskError::ParseError {
            path: path.to_string(),
            message: "missing H1 title".to_string(),
        });
    }

    Ok(Task {
        path: path.to_string(),
        title,
        body: body_lines.join("\n").trim().to_string(),
        subtasks: parse_subtasks(&subtask_lines),
        front_matter,
    })
}

fn split_front_matter(path: &str, content: &str) -> Result<(FrontMatter, String), TaskError> {
    let trimmed = content.trim_start_matches('\u{feff}');
    if !trimmed.starts_with(FENCE) {
        return Ok((FrontMatter::default(), trimmed.to_string()));
    }

    let after_open = &trimmed[FENCE.len()..];
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);
    let Some(close) = after_open.find("\n---") else {
        return Err(TaskError::ParseError {
            path: path.to_string(),
            message: "unterminated front matter".to_string(),
        });
    };

    let toml_text = &after_open[..close];
    let rest = after_open[close + "\n---".len()..]
        .trim_start_matches('\n')
        .to_string();

    let front_matter: FrontMatter =
        toml::from_str(toml_text).map_err(|e| TaskError::ParseError {
            path: path.to_string(),
            message: format!("front matter: {}", e),
        })?;
    Ok((front_matter, rest))
}

/// `### [status] Title (id: st-xxxxxx)` plus its checkbox lines.
fn parse_subtasks(lines: &[&str]) -> Vec<Subtask> {
    let mut subtasks: Vec<Subtask> = Vec::new();

    for line in lines {
        if let Some(heading) = line.strip_prefix("### ") {
            if let Some(subtask) = parse_subtask_heading(heading) {
                subtasks.push(subtask);
            }
            continue;
        }
        let Some(current) = subtasks.last_mut() else {
            continue;
        };
        let trimmed = line.trim_start();
        if let Some(text) = trimmed.strip_prefix("- [x] ") {
            current.items.push(ChecklistItem {
                text: text.to_string(),
                checked: true,
            });
        } else if let Some(text) = trimmed.strip_prefix("- [ ] ") {
            current.items.push(ChecklistItem {
                text: text.to_string(),
                checked: false,
            });
        }
    }

    subtasks
}

fn parse_subtask_heading(heading: &str) -> Option<Subtask> {
    let rest = heading.strip_prefix('[')?;
    let (status, rest) = rest.split_once("] ")?;
    let (title, rest) = rest.rsplit_once(" (id: ")?;
    let id = rest.strip_suffix(')')?;

    let status = match status {
        "pending" => SubtaskStatus::Pending,
        "in_progress" => SubtaskStatus::InProgress,
        "completed" => SubtaskStatus::Completed,
        _ => return None,
    };

    Some(Subtask {
        id: id.to_string(),
        title: title.to_string(),
        status,
        items: Vec::new(),
    })
}

fn status_str(status: SubtaskStatus) -> &'static str {
    match status {
        SubtaskStatus::Pending => "pending",
        SubtaskStatus::InProgress => "in_progress",
        SubtaskStatus::Completed => "completed",
    }
}

/// Render a task back to its on-disk form.
pub fn render_task(task: &Task) -> String {
    let mut out = String::new();

    let toml_text = toml::to_string(&task.front_matter).unwrap_or_default();
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(&toml_text);
    out.push_str(FENCE);
    out.push_str("\n\n");

    out.push_str("# ");
    out.push_str(&task.title);
    out.push_str("\n\n");

    if !task.body.is_empty() {
        out.push_str(&task.body);
        out.push_str("\n\n");
    }

    if !task.subtasks.is_empty() {
        out.push_str(SUBTASKS_HEADING);
        out.push('\n');
        for subtask in &task.subtasks {
            out.push('\n');
            out.push_str(&format!(
                "### [{}] {} (id: {})\n",
                status_str(subtask.status),
                subtask.title,
                subtask.id
            ));
            for item in &subtask.items {
                let mark = if item.checked { "x" } else { " " };
                out.push_str(&format!("- [{}] {}\n", mark, item.text));
            }
        }
    }

    out
}
