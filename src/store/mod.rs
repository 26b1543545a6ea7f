//! Typed document store over the data repository.
//!
//! Every accessor goes through the repository's operation queue, and every
//! mutation re-reads the document, applies the change and writes the whole
//! document back inside one queued operation. No document is cached.

mod backlog;
mod project;
mod schema;
pub mod types;

pub use types::{
    Backlog, DocumentSchema, NewTask, Project, ProjectStatus, SchemaSection, SchemaSubsection,
    Task, TaskStatus, TaskUpdate,
};

use crate::error::Result;
use crate::sync::{CommitOutcome, DataRepo};

pub const PROJECT_FILE: &str = "project.json";
pub const BACKLOG_FILE: &str = "backlog.json";
pub const SCHEMA_FILE: &str = "schema.json";

/// Explicit store handle shared by the scheduler and command handlers.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    repo: DataRepo,
}

impl DocumentStore {
    pub fn new(repo: DataRepo) -> Self {
        Self { repo }
    }

    /// Underlying repository (for raw artifact reads and writes).
    pub fn repo(&self) -> &DataRepo {
        &self.repo
    }

    /// Commit and push everything written since the last commit.
    pub async fn commit_and_push(&self, message: &str) -> Result<CommitOutcome> {
        self.repo.commit_and_push(message).await
    }
}
