use super::{DocumentStore, PROJECT_FILE};
use crate::error::{NautilusError, Result};
use crate::store::types::Project;

impl DocumentStore {
    /// `None` until a project has been initialized.
    pub async fn read_project(&self) -> Result<Option<Project>> {
        self.repo.read_json(PROJECT_FILE).await
    }

    pub async fn write_project(&self, project: &Project) -> Result<()> {
        self.repo.write_json(PROJECT_FILE, project).await
    }

    /// Re-read the project, apply `mutate`, write it back; returns the result.
    ///
    /// # Errors
    ///
    /// [`NautilusError::ProjectMissing`] when `project.json` does not exist.
    pub async fn update_project<F>(&self, mutate: F) -> Result<Project>
    where
        F: FnOnce(&mut Project) + Send + 'static,
    {
        self.repo
            .update_existing_json(PROJECT_FILE, move |project: &mut Project| {
                mutate(project);
                Ok(project.clone())
            })
            .await?
            .ok_or(NautilusError::ProjectMissing)
    }
}
