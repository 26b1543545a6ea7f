//! Persisted document types: `project.json`, `backlog.json`, `schema.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a research task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be picked by the heartbeat.
    Queued,
    /// Claimed by a heartbeat cycle.
    InProgress,
    /// Research artifact written.
    Completed,
    /// Research failed; terminal.
    Failed,
}

impl TaskStatus {
    /// `completed` or `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name, as stored in `backlog.json`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of schedulable research work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Slug of the schema section this task belongs to.
    pub category: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Repository-relative path of the research artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl Task {
    /// Build a freshly queued task with a generated id.
    pub fn queued(input: NewTask) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: input.title,
            description: input.description,
            category: input.category,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            completed_at: None,
            output_path: None,
        }
    }
}

/// Caller-supplied fields for a new task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

impl NewTask {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: category.into(),
        }
    }
}

/// Partial update merged into a task by `update_task`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_path: Option<String>,
}

impl TaskUpdate {
    /// Update that only changes the status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Mark completed with an artifact path and completion time.
    pub fn completed(output_path: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            completed_at: Some(at),
            output_path: Some(output_path.into()),
        }
    }

    pub(crate) fn apply(self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(at) = self.completed_at {
            task.completed_at = Some(at);
        }
        if let Some(path) = self.output_path {
            task.output_path = Some(path);
        }
    }
}

/// Ordered task list persisted as `backlog.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Backlog {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Backlog {
    /// First queued task in array order.
    pub fn next_queued(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Queued)
    }

    /// First task currently in progress.
    pub fn in_progress(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::InProgress)
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Number of tasks with `status`.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    /// Move every in-progress task back to queued. Returns how many moved.
    pub fn requeue_in_progress(&mut self) -> usize {
        let mut moved = 0;
        for task in &mut self.tasks {
            if task.status == TaskStatus::InProgress {
                task.status = TaskStatus::Queued;
                moved += 1;
            }
        }
        moved
    }
}

/// Project lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Scoping,
    Active,
    Paused,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scoping => "scoping",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level project persisted as `project.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub scope: String,
    pub status: ProjectStatus,
    pub heartbeat_interval_minutes: u64,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub site_url: String,
}

impl Project {
    /// New project stamped with the current time.
    pub fn new(
        slug: impl Into<String>,
        title: impl Into<String>,
        scope: impl Into<String>,
        status: ProjectStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slug.into(),
            title: title.into(),
            scope: scope.into(),
            status,
            heartbeat_interval_minutes: 30,
            model: String::new(),
            created_at: now,
            updated_at: now,
            site_url: String::new(),
        }
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Grouping taxonomy persisted as `schema.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSchema {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sections: Vec<SchemaSection>,
}

/// Top-level schema section; task categories are section slugs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSection {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub subsections: Vec<SchemaSubsection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSubsection {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

impl DocumentSchema {
    pub fn find_section(&self, slug: &str) -> Option<&SchemaSection> {
        self.sections.iter().find(|s| s.slug == slug)
    }

    /// Insert a section and keep sections sorted by `order`.
    pub fn push_section(&mut self, section: SchemaSection) {
        self.sections.push(section);
        self.sections.sort_by_key(|s| s.order);
    }

    /// One past the highest section order (0 for an empty schema).
    pub fn next_order(&self) -> i64 {
        self.sections.iter().map(|s| s.order).max().map_or(0, |m| m + 1)
    }

    /// Put `task_id` at the front of the section's first subsection.
    ///
    /// A section without subsections gets a `general` one. Returns `false`
    /// when the section does not exist.
    pub fn attach_task(&mut self, section_slug: &str, task_id: &str) -> bool {
        let Some(section) = self.sections.iter_mut().find(|s| s.slug == section_slug) else {
            return false;
        };
        if section.subsections.is_empty() {
            section.subsections.push(SchemaSubsection {
                slug: "general".to_owned(),
                title: section.title.clone(),
                task_ids: Vec::new(),
            });
        }
        section.subsections[0].task_ids.insert(0, task_id.to_owned());
        true
    }
}
