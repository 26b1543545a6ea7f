//! Derived site manifests (`toc.json`, `pages.json`).
//!
//! Regenerated from the documents after every state-changing cycle; never
//! edited by hand.

use crate::content::page_route;
use crate::error::Result;
use crate::store::{
    Backlog, DocumentSchema, DocumentStore, Project, SchemaSection, Task, TaskStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const TOC_PATH: &str = "site/src/generated/toc.json";
pub const PAGES_PATH: &str = "site/src/generated/pages.json";

/// Regenerates derived site artifacts.
#[async_trait]
pub trait SiteBuilder: Send + Sync {
    async fn regenerate(&self) -> Result<()>;
}

/// Writes `toc.json` and `pages.json` into the data repository.
pub struct ManifestSiteBuilder {
    store: DocumentStore,
}

impl ManifestSiteBuilder {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SiteBuilder for ManifestSiteBuilder {
    async fn regenerate(&self) -> Result<()> {
        let project = self.store.read_project().await?;
        let schema = self.store.read_schema().await?;
        let backlog = self.store.read_backlog().await?;

        let toc = build_toc(project.as_ref(), &schema, &backlog, Utc::now());
        let pages = build_pages(&backlog.tasks);

        let repo = self.store.repo();
        repo.write_file(TOC_PATH, json_file(&toc)?).await?;
        repo.write_file(PAGES_PATH, json_file(&pages)?).await?;
        Ok(())
    }
}

fn json_file<T: Serialize>(value: &T) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string_pretty(value)?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toc {
    pub generated_at: DateTime<Utc>,
    pub project: TocProject,
    pub sections: Vec<TocSection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TocProject {
    pub title: String,
    pub scope: String,
    pub status: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub site_url: String,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStats {
    pub total: usize,
    pub completed: usize,
    pub queued: usize,
    pub in_progress: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct TocSection {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub order: i64,
    pub stats: SectionStats,
    pub subsections: Vec<TocSubsection>,
}

#[derive(Debug, Serialize)]
pub struct TocSubsection {
    pub slug: String,
    pub title: String,
    pub tasks: Vec<TocTask>,
}

#[derive(Debug, Serialize)]
pub struct TocTask {
    pub id: String,
    pub title: String,
    /// Task status, or `unknown` for ids missing from the backlog.
    pub status: String,
    pub route: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    pub task_id: String,
    pub title: String,
    pub category: String,
    pub output_path: String,
    pub route: String,
}

fn completed_route(task: &Task) -> Option<String> {
    if task.status != TaskStatus::Completed {
        return None;
    }
    task.output_path.as_deref().map(page_route)
}

fn build_section(section: &SchemaSection, by_id: &HashMap<&str, &Task>) -> TocSection {
    let mut stats = SectionStats::default();
    let subsections = section
        .subsections
        .iter()
        .map(|sub| {
            let tasks = sub
                .task_ids
                .iter()
                .map(|id| {
                    let task = by_id.get(id.as_str()).copied();
                    stats.total += 1;
                    match task.map(|t| t.status) {
                        Some(TaskStatus::Completed) => stats.completed += 1,
                        Some(TaskStatus::Queued) => stats.queued += 1,
                        Some(TaskStatus::InProgress) => stats.in_progress += 1,
                        Some(TaskStatus::Failed) => stats.failed += 1,
                        None => {}
                    }
                    TocTask {
                        id: id.clone(),
                        title: task.map_or_else(
                            || format!("Missing task ({})", id.chars().take(8).collect::<String>()),
                            |t| t.title.clone(),
                        ),
                        status: task.map_or("unknown", |t| t.status.as_str()).to_owned(),
                        route: task.and_then(completed_route),
                    }
                })
                .collect();
            TocSubsection {
                slug: sub.slug.clone(),
                title: sub.title.clone(),
                tasks,
            }
        })
        .collect();

    TocSection {
        slug: section.slug.clone(),
        title: section.title.clone(),
        description: section.description.clone(),
        order: section.order,
        stats,
        subsections,
    }
}

pub fn build_toc(
    project: Option<&Project>,
    schema: &DocumentSchema,
    backlog: &Backlog,
    generated_at: DateTime<Utc>,
) -> Toc {
    let by_id: HashMap<&str, &Task> = backlog.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut sections: Vec<TocSection> = schema
        .sections
        .iter()
        .map(|section| build_section(section, &by_id))
        .collect();
    sections.sort_by_key(|s| s.order);

    Toc {
        generated_at,
        project: TocProject {
            title: project.map(|p| p.title.clone()).unwrap_or_default(),
            scope: project.map(|p| p.scope.clone()).unwrap_or_default(),
            status: project.map_or("scoping", |p| p.status.as_str()).to_owned(),
            updated_at: project.map(|p| p.updated_at),
            site_url: project.map(|p| p.site_url.clone()).unwrap_or_default(),
        },
        sections,
    }
}

/// Completed pages, one per route (first task wins), sorted by route then title.
pub fn build_pages(tasks: &[Task]) -> Vec<PageEntry> {
    let mut by_route: BTreeMap<String, PageEntry> = BTreeMap::new();
    for task in tasks {
        let (Some(route), Some(output_path)) = (completed_route(task), task.output_path.as_ref())
        else {
            continue;
        };
        if route.is_empty() {
            continue;
        }
        by_route.entry(route.clone()).or_insert_with(|| PageEntry {
            task_id: task.id.clone(),
            title: task.title.clone(),
            category: task.category.clone(),
            output_path: output_path.clone(),
            route,
        });
    }
    // BTreeMap keys are unique routes, so route order alone is total.
    by_route.into_values().collect()
}
