//! One heartbeat cycle: eligibility, task selection, execution, settling.

use crate::content::{page_url, write_content_file};
use crate::error::Result;
use crate::notify::Notification;
use crate::research::ResearchRequest;
use crate::scheduler::Heartbeat;
use crate::store::{Project, ProjectStatus, Task, TaskStatus, TaskUpdate};
use chrono::Utc;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

/// Why a cycle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `project.json` does not exist.
    NoProject,
    /// Project is not `active`.
    ProjectStatus(ProjectStatus),
    /// A task is already `in_progress`.
    TaskInProgress,
    /// The backlog has no tasks at all.
    EmptyBacklog,
}

/// Result of one heartbeat cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    /// No queued tasks remained; the project was marked completed.
    ProjectCompleted,
    TaskCompleted {
        task_id: String,
        output_path: String,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
}

struct Settled {
    output_path: String,
    page_url: String,
    follow_up_topics: Vec<String>,
}

impl Heartbeat {
    /// Run one cycle against the current documents.
    ///
    /// Does not take the busy lock or run recovery; see [`Heartbeat::tick`].
    pub(crate) async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Some(project) = self.store.read_project().await? else {
            debug!("no project; skipping heartbeat");
            return Ok(CycleOutcome::Skipped(SkipReason::NoProject));
        };
        if project.status != ProjectStatus::Active {
            debug!(status = %project.status, "project not active; skipping heartbeat");
            return Ok(CycleOutcome::Skipped(SkipReason::ProjectStatus(
                project.status,
            )));
        }

        let backlog = self.store.read_backlog().await?;
        if let Some(running) = backlog.in_progress() {
            debug!(task_id = %running.id, "task already in progress; skipping heartbeat");
            return Ok(CycleOutcome::Skipped(SkipReason::TaskInProgress));
        }

        let Some(task) = backlog.next_queued().cloned() else {
            if backlog.tasks.is_empty() {
                debug!("backlog empty; skipping heartbeat");
                return Ok(CycleOutcome::Skipped(SkipReason::EmptyBacklog));
            }
            return self.complete_project().await;
        };

        self.execute(&project, task).await
    }

    async fn complete_project(&self) -> Result<CycleOutcome> {
        let project = self
            .store
            .update_project(|p| {
                p.status = ProjectStatus::Completed;
                p.touch();
            })
            .await?;
        info!(slug = %project.slug, "no queued tasks remain; project completed");

        if let Err(e) = self.site.regenerate().await {
            warn!(error = %e, "site regeneration failed after project completion");
        }
        self.store
            .commit_and_push("Mark project completed: no queued tasks remain")
            .await?;
        self.safe_notify(Notification::ProjectCompleted {
            project_title: project.title,
        })
        .await;
        Ok(CycleOutcome::ProjectCompleted)
    }

    async fn execute(&self, project: &Project, task: Task) -> Result<CycleOutcome> {
        let task = self
            .store
            .update_task(&task.id, TaskUpdate::status(TaskStatus::InProgress))
            .await?;
        info!(task_id = %task.id, title = %task.title, "research task started");

        match self.research_and_record(project, &task).await {
            Ok(settled) => {
                self.store
                    .commit_and_push(&format!("Complete research task: {}", task.title))
                    .await?;
                info!(task_id = %task.id, output = %settled.output_path, "research task completed");
                self.safe_notify(Notification::TaskCompleted {
                    task_title: task.title.clone(),
                    page_url: settled.page_url,
                    follow_up_topics: settled.follow_up_topics,
                })
                .await;
                Ok(CycleOutcome::TaskCompleted {
                    task_id: task.id,
                    output_path: settled.output_path,
                })
            }
            Err(e) => self.settle_failure(&task, e).await,
        }
    }

    /// Research the task and record the result locally (no commit).
    async fn research_and_record(
        &self,
        project: &Project,
        task: &Task,
    ) -> anyhow::Result<Settled> {
        let schema = self.store.read_schema().await?;
        let (section_title, section_description) = match schema.find_section(&task.category) {
            Some(section) => (section.title.clone(), section.description.clone()),
            None => (task.category.clone(), String::new()),
        };

        let request = ResearchRequest {
            project_scope: project.scope.clone(),
            task: task.clone(),
            section_title,
            section_description,
        };
        let output = AssertUnwindSafe(self.research.run(request))
            .catch_unwind()
            .await
            .map_err(|panic| {
                anyhow::anyhow!("research agent panicked: {}", panic_message(&*panic))
            })??
            .validated()?;

        let completed_at = Utc::now();
        let output_path = write_content_file(
            self.store.repo(),
            task,
            &output.markdown,
            &output.sources,
            completed_at,
        )
        .await?;
        self.store
            .update_task(
                &task.id,
                TaskUpdate::completed(output_path.clone(), completed_at),
            )
            .await?;
        let project = self
            .store
            .update_project(move |p| p.updated_at = completed_at)
            .await?;
        self.site.regenerate().await?;

        Ok(Settled {
            page_url: page_url(&project.site_url, &output_path),
            output_path,
            follow_up_topics: output.follow_up_topics,
        })
    }

    async fn settle_failure(&self, task: &Task, cause: anyhow::Error) -> Result<CycleOutcome> {
        let message = format!("{cause:#}");
        error!(task_id = %task.id, error = %message, "research task failed");

        self.store
            .update_task(&task.id, TaskUpdate::status(TaskStatus::Failed))
            .await?;
        self.store.update_project(Project::touch).await?;
        if let Err(e) = self.site.regenerate().await {
            warn!(error = %e, "site regeneration failed after task failure");
        }
        self.store
            .commit_and_push(&format!("Mark research task failed: {}", task.title))
            .await?;
        self.safe_notify(Notification::TaskFailed {
            task_title: task.title.clone(),
            error_message: message.clone(),
        })
        .await;
        Ok(CycleOutcome::TaskFailed {
            task_id: task.id.clone(),
            error: message,
        })
    }

    async fn safe_notify(&self, notification: Notification) {
        let kind = notification.kind();
        match tokio::time::timeout(self.notify_timeout, self.notifier.notify(notification)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(kind, error = %e, "notification failed"),
            Err(_) => warn!(
                kind,
                timeout_secs = self.notify_timeout.as_secs_f64(),
                "notification timed out"
            ),
        }
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
