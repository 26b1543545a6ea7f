//! Command handlers.
//!
//! Transport-free: each handler mutates the documents through the store,
//! commits, and returns the reply text shown to the user.

use crate::config::ProjectDefaults;
use crate::content::slugify;
use crate::error::{NautilusError, Result};
use crate::store::{
    DocumentSchema, DocumentStore, NewTask, Project, ProjectStatus, SchemaSection,
    SchemaSubsection, TaskStatus,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::info;

const MAX_SECTION_SLUG_LEN: usize = 60;
const NO_PROJECT_REPLY: &str = "No project found yet. Start one with init <plan>.";

/// Initial project definition, usually loaded from a TOML plan file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectPlan {
    pub title: String,
    pub scope: String,
    /// Project slug (defaults to the slugified title).
    pub slug: Option<String>,
    pub schema_title: String,
    pub schema_description: String,
    pub sections: Vec<PlanSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanSection {
    pub slug: Option<String>,
    pub title: String,
    pub description: String,
    pub order: Option<i64>,
    pub subsections: Vec<PlanSubsection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanSubsection {
    pub slug: Option<String>,
    pub title: String,
    pub tasks: Vec<PlanTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanTask {
    pub title: String,
    pub description: String,
}

impl ProjectPlan {
    /// Parse a TOML plan.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| NautilusError::InvalidPlan(e.to_string()))
    }
}

/// Handlers for the user-facing commands.
#[derive(Debug, Clone)]
pub struct Commands {
    store: DocumentStore,
    defaults: ProjectDefaults,
    heartbeat_interval_minutes: u64,
}

impl Commands {
    pub fn new(
        store: DocumentStore,
        defaults: ProjectDefaults,
        heartbeat_interval_minutes: u64,
    ) -> Self {
        Self {
            store,
            defaults,
            heartbeat_interval_minutes,
        }
    }

    /// Queue a task at the front of the backlog.
    ///
    /// `input.category` is matched against section slugs and titles; an
    /// unknown category creates a new section.
    pub async fn add(&self, input: NewTask) -> Result<String> {
        let title = normalize_text(&input.title);
        if title.is_empty() {
            return Ok("Usage: add <title> [--description ..] [--category ..]".to_owned());
        }
        let Some(project) = self.store.read_project().await? else {
            return Ok(NO_PROJECT_REPLY.to_owned());
        };
        if project.status == ProjectStatus::Scoping {
            return Ok("Scoping is still in progress. Finish init before adding tasks.".to_owned());
        }

        let requested = normalize_text(&input.category);
        let fallback = title.clone();
        let section_slug = self
            .store
            .update_schema(move |schema| Ok(resolve_or_create_section(schema, &requested, &fallback)))
            .await?;

        let task = self
            .store
            .add_task(NewTask::new(
                title,
                normalize_text(&input.description),
                section_slug.clone(),
            ))
            .await?;
        let task_id = task.id.clone();
        let slug = section_slug.clone();
        self.store
            .update_schema(move |schema| Ok(schema.attach_task(&slug, &task_id)))
            .await?;

        let project = if project.status == ProjectStatus::Completed {
            self.store
                .update_project(|p| {
                    p.status = ProjectStatus::Active;
                    p.touch();
                })
                .await?
        } else {
            project
        };

        self.store
            .commit_and_push(&format!("Add backlog task: {}", task.title))
            .await?;
        info!(task_id = %task.id, category = %section_slug, "queued task");

        let mut lines = vec![format!("Added to backlog: {}", task.title)];
        if project.status == ProjectStatus::Paused {
            lines.push("Research is currently paused. Use resume to process this task.".to_owned());
        } else {
            lines.push("It will be researched in the next heartbeat cycle.".to_owned());
        }
        Ok(lines.join("\n"))
    }

    pub async fn pause(&self) -> Result<String> {
        let Some(project) = self.store.read_project().await? else {
            return Ok(NO_PROJECT_REPLY.to_owned());
        };
        match project.status {
            ProjectStatus::Paused => {
                return Ok("Research is already paused. Use resume to continue.".to_owned());
            }
            ProjectStatus::Active => {}
            other => return Ok(format!("Can't pause: project is {other}.")),
        }

        self.store
            .update_project(|p| {
                p.status = ProjectStatus::Paused;
                p.touch();
            })
            .await?;
        self.store.commit_and_push("Pause research heartbeat").await?;
        Ok("Research paused. Use resume to continue.".to_owned())
    }

    pub async fn resume(&self) -> Result<String> {
        let Some(project) = self.store.read_project().await? else {
            return Ok(NO_PROJECT_REPLY.to_owned());
        };
        match project.status {
            ProjectStatus::Active => return Ok("Research is already running.".to_owned()),
            ProjectStatus::Paused => {}
            other => return Ok(format!("Can't resume: project is {other}.")),
        }

        self.store
            .update_project(|p| {
                p.status = ProjectStatus::Active;
                p.touch();
            })
            .await?;
        self.store.commit_and_push("Resume research heartbeat").await?;

        match self.store.pick_next_task().await? {
            Some(next) => Ok(format!("Research resumed. Next task: {}", next.title)),
            None => Ok(
                "Research resumed, but the backlog is empty. Use add <topic> to add tasks."
                    .to_owned(),
            ),
        }
    }

    pub async fn status(&self) -> Result<String> {
        let Some(project) = self.store.read_project().await? else {
            return Ok(NO_PROJECT_REPLY.to_owned());
        };
        let backlog = self.store.read_backlog().await?;
        let completed = backlog.count(TaskStatus::Completed);
        let failed = backlog.count(TaskStatus::Failed);

        let mut progress = format!(
            "Progress: {completed}/{} tasks completed",
            backlog.tasks.len()
        );
        if failed > 0 {
            progress.push_str(&format!(" ({failed} failed)"));
        }
        let mut lines = vec![
            format!("Project: {}", project.title),
            format!("Status: {}", project.status),
            progress,
        ];
        if let Some(task) = backlog.in_progress() {
            lines.push(format!("In progress: {}", task.title));
        } else if let Some(task) = backlog.next_queued() {
            lines.push(format!("Next up: {}", task.title));
        }
        lines.push(format!(
            "Last activity: {}",
            format_relative_time(project.updated_at, Utc::now())
        ));
        lines.push(format!("Site: {}", project.site_url));
        Ok(lines.join("\n"))
    }

    /// Queued tasks grouped by section title, in first-seen order.
    pub async fn backlog(&self) -> Result<String> {
        if self.store.read_project().await?.is_none() {
            return Ok(NO_PROJECT_REPLY.to_owned());
        }
        let backlog = self.store.read_backlog().await?;
        let queued: Vec<_> = backlog
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Queued)
            .collect();
        if queued.is_empty() {
            return Ok("Backlog is empty. All tasks are completed!".to_owned());
        }

        let schema = self.store.read_schema().await?;
        let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
        for task in &queued {
            match groups.iter_mut().find(|(c, _)| *c == task.category) {
                Some((_, titles)) => titles.push(task.title.as_str()),
                None => groups.push((task.category.as_str(), vec![task.title.as_str()])),
            }
        }

        let mut lines = vec![format!("Backlog: {} tasks pending", queued.len()), String::new()];
        for (category, titles) in groups {
            let heading = schema
                .find_section(category)
                .map_or(category, |s| s.title.as_str());
            lines.push(format!("{heading} ({})", titles.len()));
            lines.extend(titles.iter().map(|t| format!("  - {t}")));
            lines.push(String::new());
        }
        Ok(lines.join("\n").trim_end().to_owned())
    }

    /// (Re)initialize the project from a plan. Replaces the backlog and schema.
    pub async fn init(&self, plan: ProjectPlan) -> Result<String> {
        let title = normalize_text(&plan.title);
        if title.is_empty() {
            return Err(NautilusError::InvalidPlan("title is empty".to_owned()));
        }
        let (mut schema, planned) = normalize_plan(&plan);
        let task_count: usize = planned.iter().map(Vec::len).sum();
        if task_count == 0 {
            return Err(NautilusError::InvalidPlan("plan has no tasks".to_owned()));
        }

        let inputs: Vec<NewTask> = schema
            .sections
            .iter()
            .zip(&planned)
            .flat_map(|(section, tasks)| {
                tasks.iter().map(move |(_, task)| {
                    NewTask::new(
                        normalize_text(&task.title),
                        normalize_text(&task.description),
                        section.slug.clone(),
                    )
                })
            })
            .collect();
        let queued = self.store.set_queued_tasks(inputs).await?;

        let mut ids = queued.iter().map(|t| t.id.clone());
        for (section, tasks) in schema.sections.iter_mut().zip(&planned) {
            for (sub_index, _) in tasks {
                if let (Some(sub), Some(id)) = (section.subsections.get_mut(*sub_index), ids.next())
                {
                    sub.task_ids.push(id);
                }
            }
        }
        schema.title = plan.schema_title.clone();
        schema.description = plan.schema_description.clone();
        self.store.write_schema(&schema).await?;

        let slug = plan
            .slug
            .as_deref()
            .map(|s| slugify(s, MAX_SECTION_SLUG_LEN))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| match slugify(&title, MAX_SECTION_SLUG_LEN) {
                s if s.is_empty() => "project".to_owned(),
                s => s,
            });
        let mut project = Project::new(&slug, &title, normalize_text(&plan.scope), ProjectStatus::Active);
        project.heartbeat_interval_minutes = self.heartbeat_interval_minutes;
        project.model = self.defaults.default_model.clone();
        project.site_url = self.defaults.site_url.clone();
        self.store.write_project(&project).await?;

        self.store
            .commit_and_push(&format!("Initialize project: {slug}"))
            .await?;
        info!(%slug, tasks = queued.len(), sections = schema.sections.len(), "project initialized");

        let mut lines = vec![
            format!("Project ready: {title}"),
            format!("Queued {} tasks across {} sections:", queued.len(), schema.sections.len()),
        ];
        for (section, tasks) in schema.sections.iter().zip(&planned) {
            lines.push(format!("- {} ({})", section.title, tasks.len()));
        }
        Ok(lines.join("\n"))
    }

    /// Requeue tasks stuck `in_progress` and commit the result.
    pub async fn recover(&self) -> Result<String> {
        let recovered = self.store.requeue_in_progress_tasks().await?;
        if recovered == 0 {
            return Ok("No interrupted tasks found.".to_owned());
        }
        self.store
            .commit_and_push(&format!("Requeue {recovered} interrupted research tasks"))
            .await?;
        Ok(format!("Requeued {recovered} interrupted tasks."))
    }
}

fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `base`, or `base-2`, `base-3`, ... whichever is unused.
fn unique_slug(input: &str, used: &mut HashSet<String>, fallback: &str) -> String {
    let base = match slugify(input, MAX_SECTION_SLUG_LEN) {
        s if s.is_empty() => fallback.to_owned(),
        s => s,
    };
    let mut candidate = base.clone();
    let mut index = 2;
    while used.contains(&candidate) {
        candidate = format!("{base}-{index}");
        index += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Slug of the section matching `requested`, creating one when none does.
fn resolve_or_create_section(schema: &mut DocumentSchema, requested: &str, fallback_title: &str) -> String {
    let wanted = slugify(requested, MAX_SECTION_SLUG_LEN);
    if !wanted.is_empty() {
        if let Some(section) = schema
            .sections
            .iter()
            .find(|s| s.slug == wanted || slugify(&s.title, MAX_SECTION_SLUG_LEN) == wanted)
        {
            return section.slug.clone();
        }
    }

    let title = if requested.is_empty() {
        fallback_title.to_owned()
    } else {
        requested.to_owned()
    };
    let mut used: HashSet<String> = schema.sections.iter().map(|s| s.slug.clone()).collect();
    let slug = unique_slug(&title, &mut used, "new-category");
    schema.push_section(SchemaSection {
        slug: slug.clone(),
        description: format!("User-requested research topics related to {title}."),
        title,
        order: schema.next_order(),
        subsections: Vec::new(),
    });
    slug
}

/// Schema skeleton (no task ids) plus, per section, `(subsection index, task)`
/// pairs in backlog order. Sections are sorted by order and renumbered;
/// duplicate task titles are dropped.
fn normalize_plan(plan: &ProjectPlan) -> (DocumentSchema, Vec<Vec<(usize, PlanTask)>>) {
    let mut section_slugs = HashSet::new();
    let mut subsection_slugs = HashSet::new();
    let mut seen_titles = HashSet::new();

    let mut sections: Vec<(i64, SchemaSection, Vec<(usize, PlanTask)>)> = plan
        .sections
        .iter()
        .enumerate()
        .map(|(i, section)| {
            let slug = unique_slug(
                section.slug.as_deref().unwrap_or(&section.title),
                &mut section_slugs,
                &format!("section-{}", i + 1),
            );
            let mut tasks = Vec::new();
            let subsections = section
                .subsections
                .iter()
                .enumerate()
                .map(|(j, sub)| {
                    for task in &sub.tasks {
                        let key = normalize_text(&task.title).to_lowercase();
                        if !key.is_empty() && seen_titles.insert(key) {
                            tasks.push((j, task.clone()));
                        }
                    }
                    SchemaSubsection {
                        slug: unique_slug(
                            sub.slug.as_deref().unwrap_or(&sub.title),
                            &mut subsection_slugs,
                            &format!("subsection-{}-{}", i + 1, j + 1),
                        ),
                        title: sub.title.clone(),
                        task_ids: Vec::new(),
                    }
                })
                .collect();
            let order = section.order.unwrap_or(i as i64);
            let schema_section = SchemaSection {
                slug,
                title: section.title.clone(),
                description: section.description.clone(),
                order,
                subsections,
            };
            (order, schema_section, tasks)
        })
        .collect();
    sections.sort_by_key(|(order, _, _)| *order);

    let mut schema = DocumentSchema::default();
    let mut planned = Vec::with_capacity(sections.len());
    for (index, (_, mut section, tasks)) in sections.into_iter().enumerate() {
        section.order = index as i64;
        schema.sections.push(section);
        planned.push(tasks);
    }
    (schema, planned)
}

/// `just now`, `5m ago`, `3h ago`, `2d ago`.
pub fn format_relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes();
    if minutes < 1 {
        return "just now".to_owned();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}
