//! Git-replicated document storage.
//!
//! The [`queue`] serializes all local I/O, [`git`] drives the `git` CLI and
//! [`repo`] combines both into the clone/pull/commit/push lifecycle.

pub mod git;
pub mod queue;
pub mod repo;

pub use queue::OperationQueue;
pub use repo::{CommitOutcome, DataRepo};
