//! Versioned task-file operations.
//!
//! Every mutation re-reads the file, applies the change, bumps the version,
//! and writes the whole document back. Client-driven mutations carry an
//! `expected_version` and fail with a conflict (reporting the current
//! version) when it mismatches; workflow-internal mutations (merge records,
//! QA status) bump the version without an expectation.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use agentz_protocol::{QaStatus, SubtaskStatus, TaskMerge};

use crate::tasks::errors::TaskError;
use crate::tasks::parse::{parse_task, render_task};
use crate::tasks::types::{ChecklistItem, Subtask, Task};

#[derive(Debug, Clone)]
pub struct TaskStore {
    repo_root: PathBuf,
}

/// Partial update applied to one subtask.
#[derive(Debug, Clone, Default)]
pub struct SubtaskUpdate {
    pub title: Option<String>,
    pub status: Option<SubtaskStatus>,
    pub items: Option<Vec<ChecklistItem>>,
}

impl TaskStore {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn absolute(&self, task_path: &str) -> PathBuf {
        self.repo_root.join(task_path)
    }

    /// Create `tasks/<slug>.md` and return its repo-relative path. An
    /// existing slug gets a numeric suffix rather than being overwritten.
    pub fn create_task(&self, title: &str, body: &str) -> Result<String, TaskError> {
        let slug = slugify(title);
        let tasks_dir = self.repo_root.join("tasks");
        std::fs::create_dir_all(&tasks_dir)?;

        let mut task_path = format!("tasks/{}.md", slug);
        let mut counter = 2;
        while self.absolute(&task_path).exists() {
            task_path = format!("tasks/{}-{}.md", slug, counter);
            counter += 1;
        }

        let task = Task {
            path: task_path.clone(),
            title: title.to_string(),
            body: body.to_string(),
            subtasks: Vec::new(),
            front_matter: crate::tasks::types::FrontMatter {
                version: 1,
                ..Default::default()
            },
        };
        std::fs::write(self.absolute(&task_path), render_task(&task))?;

        info!(event = "core.tasks.created", path = %task_path, title);
        Ok(task_path)
    }

    pub fn read_task(&self, task_path: &str) -> Result<Task, TaskError> {
        let content = match std::fs::read_to_string(self.absolute(task_path)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TaskError::NotFound {
                    path: task_path.to_string(),
                });
            }
            Err(e) => return Err(TaskError::IoError { source: e }),
        };
        parse_task(task_path, &content)
    }

    fn write_task(&self, task: &Task) -> Result<(), TaskError> {
        std::fs::write(self.absolute(&task.path), render_task(task))?;
        Ok(())
    }

    /// Apply an optimistic, version-checked mutation.
    pub fn update_task<F>(
        &self,
        task_path: &str,
        expected_version: u64,
        mutate: F,
    ) -> Result<Task, TaskError>
    where
        F: FnOnce(&mut Task),
    {
        let mut task = self.read_task(task_path)?;
        if task.version() != expected_version {
            return Err(TaskError::VersionConflict {
                path: task_path.to_string(),
                expected: expected_version,
                current: task.version(),
            });
        }
        mutate(&mut task);
        task.front_matter.version += 1;
        self.write_task(&task)?;
        Ok(task)
    }

    /// Workflow-internal mutation: no version expectation, still bumps.
    fn update_unchecked<F>(&self, task_path: &str, mutate: F) -> Result<Task, TaskError>
    where
        F: FnOnce(&mut Task),
    {
        let mut task = self.read_task(task_path)?;
        mutate(&mut task);
        task.front_matter.version += 1;
        self.write_task(&task)?;
        Ok(task)
    }

    // --- Subtasks (edits touch only the Subtasks block) ---

    pub fn add_subtask(
        &self,
        task_path: &str,
        expected_version: u64,
        title: &str,
    ) -> Result<String, TaskError> {
        let id = generate_subtask_id();
        let subtask_id = id.clone();
        self.update_task(task_path, expected_version, move |task| {
            task.subtasks.push(Subtask {
                id: subtask_id,
                title: title.to_string(),
                status: SubtaskStatus::Pending,
                items: Vec::new(),
            });
        })?;
        Ok(id)
    }

    pub fn update_subtask(
        &self,
        task_path: &str,
        expected_version: u64,
        subtask_id: &str,
        update: SubtaskUpdate,
    ) -> Result<Task, TaskError> {
        // Existence check first so a missing subtask is not reported as a
        // version conflict by a retrying client.
        if self.read_task(task_path)?.subtask(subtask_id).is_none() {
            return Err(TaskError::SubtaskNotFound {
                id: subtask_id.to_string(),
            });
        }
        self.update_task(task_path, expected_version, |task| {
            if let Some(subtask) = task.subtask_mut(subtask_id) {
                if let Some(title) = update.title {
                    subtask.title = title;
                }
                if let Some(status) = update.status {
                    subtask.status = status;
                }
                if let Some(items) = update.items {
                    subtask.items = items;
                }
            }
        })
    }

    pub fn delete_subtask(
        &self,
        task_path: &str,
        expected_version: u64,
        subtask_id: &str,
    ) -> Result<Task, TaskError> {
        if self.read_task(task_path)?.subtask(subtask_id).is_none() {
            return Err(TaskError::SubtaskNotFound {
                id: subtask_id.to_string(),
            });
        }
        self.update_task(task_path, expected_version, |task| {
            task.subtasks.retain(|s| s.id != subtask_id);
        })
    }

    // --- Archive / restore ---

    /// Move the file to `tasks/archive/YYYY-MM/` and mark it archived.
    /// Returns the new repo-relative path.
    pub fn archive_task(&self, task_path: &str, year_month: &str) -> Result<String, TaskError> {
        let task = self.read_task(task_path)?;
        if task.front_matter.archived {
            return Err(TaskError::AlreadyArchived {
                path: task_path.to_string(),
            });
        }

        let file_name = Path::new(task_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("task.md");
        let archived_path = format!("tasks/archive/{}/{}", year_month, file_name);
        let absolute_target = self.absolute(&archived_path);
        if let Some(parent) = absolute_target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut task = task;
        task.front_matter.archived = true;
        task.front_matter.archived_at = Some(chrono::Utc::now().to_rfc3339());
        task.front_matter.version += 1;
        task.path = archived_path.clone();

        std::fs::write(&absolute_target, render_task(&task))?;
        std::fs::remove_file(self.absolute(task_path))?;

        info!(
            event = "core.tasks.archived",
            from = task_path,
            to = %archived_path,
        );
        Ok(archived_path)
    }

    /// Move an archived task back under `tasks/` and clear the archive
    /// markers. Returns the restored repo-relative path.
    pub fn restore_task(&self, archived_path: &str) -> Result<String, TaskError> {
        let task = self.read_task(archived_path)?;
        if !task.front_matter.archived {
            return Err(TaskError::NotArchived {
                path: archived_path.to_string(),
            });
        }

        let file_name = Path::new(archived_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("task.md");
        let restored_path = format!("tasks/{}", file_name);

        let mut task = task;
        task.front_matter.archived = false;
        task.front_matter.archived_at = None;
        task.front_matter.version += 1;
        task.path = restored_path.clone();

        std::fs::create_dir_all(self.repo_root.join("tasks"))?;
        std::fs::write(self.absolute(&restored_path), render_task(&task))?;
        std::fs::remove_file(self.absolute(archived_path))?;

        info!(
            event = "core.tasks.restored",
            from = archived_path,
            to = %restored_path,
        );
        Ok(restored_path)
    }

    // --- Workflow hooks ---

    pub fn record_merge(&self, task_path: &str, merge: TaskMerge) -> Result<Task, TaskError> {
        self.update_unchecked(task_path, |task| {
            task.front_matter.merges.push(merge);
            task.front_matter.qa_status = Some(QaStatus::Pending);
        })
    }

    /// Pair a merge record with its revert commit (I8: a merge is either
    /// live or paired with a revert, never dangling).
    pub fn record_revert(
        &self,
        task_path: &str,
        merge_hash: &str,
        revert_hash: &str,
    ) -> Result<Task, TaskError> {
        self.update_unchecked(task_path, |task| {
            let mut found = false;
            for merge in &mut task.front_matter.merges {
                if merge.commit_hash == merge_hash {
                    merge.reverted_by = Some(revert_hash.to_string());
                    found = true;
                }
            }
            if !found {
                warn!(
                    event = "core.tasks.revert_unmatched_merge",
                    path = %task.path,
                    merge_hash,
                );
            }
            task.front_matter.qa_status = Some(QaStatus::Fail);
        })
    }

    pub fn set_qa_status(&self, task_path: &str, status: QaStatus) -> Result<Task, TaskError> {
        self.update_unchecked(task_path, |task| {
            task.front_matter.qa_status = Some(status);
        })
    }

    // --- Splitting ---

    /// Create one subtask per selected H2/H3 section of the body. Bullet
    /// lines inside a selected section become unchecked items.
    pub fn split_sections(
        &self,
        task_path: &str,
        expected_version: u64,
        selected_titles: &[String],
    ) -> Result<Task, TaskError> {
        self.update_task(task_path, expected_version, |task| {
            let sections = body_sections(&task.body);
            for (heading, bullet_lines) in sections {
                if !selected_titles.iter().any(|t| t == &heading) {
                    continue;
                }
                task.subtasks.push(Subtask {
                    id: generate_subtask_id(),
                    title: heading,
                    status: SubtaskStatus::Pending,
                    items: bullet_lines
                        .into_iter()
                        .map(|text| ChecklistItem {
                            text,
                            checked: false,
                        })
                        .collect(),
                });
            }
        })
    }

    /// Fold previously-split child task files back into the parent as
    /// subtasks. Children are the tasks whose `splitFrom` names the parent;
    /// each becomes one subtask and its file is archived.
    pub fn migrate_split_from(
        &self,
        parent_path: &str,
        year_month: &str,
    ) -> Result<Task, TaskError> {
        let tasks_dir = self.repo_root.join("tasks");
        let mut children: Vec<Task> = Vec::new();

        if tasks_dir.exists() {
            for entry in std::fs::read_dir(&tasks_dir)? {
                let entry = entry?;
                if entry.path().extension().and_then(|s| s.to_str()) != Some("md") {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let child_path = format!("tasks/{}", name);
                if child_path == parent_path {
                    continue;
                }
                match self.read_task(&child_path) {
                    Ok(task)
                        if task.front_matter.split_from.as_deref() == Some(parent_path) =>
                    {
                        children.push(task);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            event = "core.tasks.migrate_child_unreadable",
                            path = %child_path,
                            error = %e,
                        );
                    }
                }
            }
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));

        let updated = self.update_unchecked(parent_path, |task| {
            for child in &children {
                let status = if child.subtasks.iter().all(|s| s.status == SubtaskStatus::Completed)
                    && !child.subtasks.is_empty()
                {
                    SubtaskStatus::Completed
                } else {
                    SubtaskStatus::Pending
                };
                task.subtasks.push(Subtask {
                    id: generate_subtask_id(),
                    title: child.title.clone(),
                    status,
                    items: child
                        .subtasks
                        .iter()
                        .map(|s| ChecklistItem {
                            text: s.title.clone(),
                            checked: s.status == SubtaskStatus::Completed,
                        })
                        .collect(),
                });
            }
        })?;

        for child in &children {
            self.archive_task(&child.path, year_month)?;
        }

        info!(
            event = "core.tasks.migrate_completed",
            parent = parent_path,
            children = children.len(),
        );
        Ok(updated)
    }
}

/// H2/H3 headings of a body with their bullet lines.
fn body_sections(body: &str) -> Vec<(String, Vec<String>)> {
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();
    for line in body.lines() {
        let heading = line
            .strip_prefix("### ")
            .or_else(|| line.strip_prefix("## "));
        if let Some(heading) = heading {
            sections.push((heading.trim().to_string(), Vec::new()));
            continue;
        }
        if let Some((_, bullets)) = sections.last_mut() {
            let trimmed = line.trim_start();
            if let Some(text) = trimmed.strip_prefix("- ") {
                let text = text
                    .strip_prefix("[ ] ")
                    .or_else(|| text.strip_prefix("[x] "))
                    .unwrap_or(text);
                bullets.push(text.to_string());
            }
        }
    }
    sections
}

fn slugify(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let collapsed = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if collapsed.is_empty() {
        "task".to_string()
    } else {
        collapsed
    }
}

fn generate_subtask_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("st-{}", &hex[..6])
}
