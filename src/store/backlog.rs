use super::{BACKLOG_FILE, DocumentStore};
use crate::error::{NautilusError, Result};
use crate::store::types::{Backlog, NewTask, Task, TaskUpdate};
use tracing::debug;

impl DocumentStore {
    /// Current backlog; empty when `backlog.json` does not exist yet.
    pub async fn read_backlog(&self) -> Result<Backlog> {
        Ok(self
            .repo
            .read_json::<Backlog>(BACKLOG_FILE)
            .await?
            .unwrap_or_default())
    }

    pub async fn write_backlog(&self, backlog: &Backlog) -> Result<()> {
        self.repo.write_json(BACKLOG_FILE, backlog).await
    }

    /// Queue a new task at the front of the backlog.
    pub async fn add_task(&self, input: NewTask) -> Result<Task> {
        let task = Task::queued(input);
        let inserted = task.clone();
        self.repo
            .update_json(BACKLOG_FILE, move |backlog: &mut Backlog| {
                backlog.tasks.insert(0, inserted);
                Ok(())
            })
            .await?;
        debug!(task_id = %task.id, "task added to backlog");
        Ok(task)
    }

    /// Append queued tasks at the end, keeping their order.
    pub async fn add_tasks(&self, inputs: Vec<NewTask>) -> Result<Vec<Task>> {
        let tasks: Vec<Task> = inputs.into_iter().map(Task::queued).collect();
        let appended = tasks.clone();
        self.repo
            .update_json(BACKLOG_FILE, move |backlog: &mut Backlog| {
                backlog.tasks.extend(appended);
                Ok(())
            })
            .await?;
        Ok(tasks)
    }

    /// Replace the whole backlog with freshly queued tasks.
    ///
    /// Destructive; only used when (re)initializing a project.
    pub async fn set_queued_tasks(&self, inputs: Vec<NewTask>) -> Result<Vec<Task>> {
        let backlog = Backlog {
            tasks: inputs.into_iter().map(Task::queued).collect(),
        };
        self.write_backlog(&backlog).await?;
        Ok(backlog.tasks)
    }

    /// First queued task in backlog order.
    pub async fn pick_next_task(&self) -> Result<Option<Task>> {
        Ok(self.read_backlog().await?.next_queued().cloned())
    }

    /// Merge `update` into the task with `task_id`.
    ///
    /// # Errors
    ///
    /// [`NautilusError::TaskNotFound`] when no task has that id.
    pub async fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<Task> {
        let task_id = task_id.to_owned();
        self.repo
            .update_json(BACKLOG_FILE, move |backlog: &mut Backlog| {
                let task = backlog
                    .tasks
                    .iter_mut()
                    .find(|t| t.id == task_id)
                    .ok_or_else(|| NautilusError::TaskNotFound(task_id.clone()))?;
                update.apply(task);
                Ok(task.clone())
            })
            .await
    }

    /// Move every in-progress task back to queued; returns how many moved.
    ///
    /// Idempotent: a second call finds nothing to change and writes nothing.
    pub async fn requeue_in_progress_tasks(&self) -> Result<usize> {
        self.repo
            .update_json(BACKLOG_FILE, |backlog: &mut Backlog| {
                Ok(backlog.requeue_in_progress())
            })
            .await
    }
}
