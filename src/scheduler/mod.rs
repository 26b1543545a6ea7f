//! Heartbeat scheduler.
//!
//! Advances at most one research task per cycle:
//! `idle → eligible-check → task-selection → executing → settling`.
//! Tasks left `in_progress` by a crashed process are requeued before the
//! first cycle.

mod cycle;
mod runner;

pub use cycle::{CycleOutcome, SkipReason};
pub use runner::HeartbeatHandle;

use crate::notify::Notifier;
use crate::research::ResearchAgent;
use crate::site::SiteBuilder;
use crate::store::DocumentStore;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// Longest a single notification may hold up a cycle.
const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Periodic research driver.
pub struct Heartbeat {
    store: DocumentStore,
    research: Arc<dyn ResearchAgent>,
    notifier: Arc<dyn Notifier>,
    site: Arc<dyn SiteBuilder>,
    interval: Duration,
    notify_timeout: Duration,
    /// Set while a cycle runs.
    busy: AtomicBool,
    /// Set once startup recovery succeeded.
    recovered: AtomicBool,
}

impl Heartbeat {
    pub fn new(
        store: DocumentStore,
        research: Arc<dyn ResearchAgent>,
        notifier: Arc<dyn Notifier>,
        site: Arc<dyn SiteBuilder>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            research,
            notifier,
            site,
            interval: interval.max(Duration::from_secs(1)),
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            busy: AtomicBool::new(false),
            recovered: AtomicBool::new(false),
        }
    }

    /// Bound the time spent delivering each notification.
    #[must_use]
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
