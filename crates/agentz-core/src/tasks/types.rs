use serde::{Deserialize, Serialize};

use agentz_protocol::{QaStatus, SubtaskStatus, TaskMerge};

/// Front-matter metadata carried at the top of a task document.
///
/// The key set is a compatibility surface: `archived`, `archivedAt`,
/// `version`, `splitFrom`, `merges`, `qaStatus`, `autoRun` are recognised
/// and round-tripped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrontMatter {
    pub version: u64,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa_status: Option<QaStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_run: Option<bool>,
    // Last: TOML arrays-of-tables must follow every scalar key.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub merges: Vec<TaskMerge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub text: String,
    pub checked: bool,
}

/// An inline subtask block under the `## Subtasks` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub status: SubtaskStatus,
    #[serde(default)]
    pub items: Vec<ChecklistItem>,
}

/// A parsed task document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Repo-relative path of the Markdown file.
    pub path: String,
    pub title: String,
    /// Markdown between the title and the Subtasks section.
    pub body: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(flatten)]
    pub front_matter: FrontMatter,
}

impl Task {
    pub fn version(&self) -> u64 {
        self.front_matter.version
    }

    pub fn subtask(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    pub fn subtask_mut(&mut self, id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }
}
