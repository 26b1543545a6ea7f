//! Nautilus: git-replicated research backlog with a heartbeat scheduler.
//!
//! A remote git repository acts as a single-writer document store for a
//! research project (`project.json`, `backlog.json`, `schema.json`). A
//! periodic heartbeat picks one queued task at a time, hands it to a
//! research collaborator, writes the resulting article, and commits.
//!
//! # Architecture
//!
//! - **Sync**: every local read, write and git command runs on one
//!   operation queue (`sync`)
//! - **Store**: typed documents on top of the queue (`store`)
//! - **Heartbeat**: eligibility check, task selection, execution and
//!   settling, with crash recovery (`scheduler`)
//! - **Collaborators**: research agent, notifier and site builder behind
//!   async traits (`research`, `notify`, `site`)

pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod notify;
pub mod research;
pub mod scheduler;
pub mod site;
pub mod store;
pub mod sync;

pub use commands::{Commands, ProjectPlan};
pub use config::NautilusConfig;
pub use error::{GitError, NautilusError, Result};
pub use scheduler::{CycleOutcome, Heartbeat, HeartbeatHandle, SkipReason};
pub use store::DocumentStore;
pub use sync::{CommitOutcome, DataRepo};
