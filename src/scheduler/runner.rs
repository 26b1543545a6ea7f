//! Heartbeat background loop.
//!
//! Spawns a tokio task that ticks on a fixed interval. Each tick takes a
//! non-blocking busy lock; a tick that finds a cycle already running is
//! dropped rather than queued.

use crate::error::Result;
use crate::scheduler::{CycleOutcome, Heartbeat};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Releases the busy flag when the cycle ends, including on error or panic.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Heartbeat {
    /// Run one guarded cycle.
    ///
    /// Returns `Ok(None)` when another cycle is still running. Startup
    /// recovery runs before the first cycle that gets the lock.
    pub async fn tick(&self) -> Result<Option<CycleOutcome>> {
        let Some(_busy) = BusyGuard::try_acquire(&self.busy) else {
            debug!("heartbeat busy; tick dropped");
            return Ok(None);
        };
        self.ensure_recovered().await?;
        self.run_cycle().await.map(Some)
    }

    /// Requeue tasks left `in_progress` by a previous run, once per process.
    async fn ensure_recovered(&self) -> Result<()> {
        if self.recovered.load(Ordering::Acquire) {
            return Ok(());
        }
        let recovered = self.store.requeue_in_progress_tasks().await?;
        if recovered > 0 {
            info!(recovered, "requeued interrupted research tasks");
        }
        self.recovered.store(true, Ordering::Release);
        Ok(())
    }

    /// Start the timer loop. The first tick fires immediately.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> HeartbeatHandle {
        let heartbeat = Arc::clone(&self);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            info!(
                interval_secs = heartbeat.interval.as_secs(),
                "heartbeat started"
            );
            let mut interval = tokio::time::interval(heartbeat.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                match AssertUnwindSafe(heartbeat.tick()).catch_unwind().await {
                    Ok(Ok(Some(outcome))) => debug!(?outcome, "heartbeat cycle finished"),
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => error!(error = %e, "heartbeat cycle aborted"),
                    Err(_) => error!("heartbeat cycle panicked; continuing with next tick"),
                }
            }
            info!("heartbeat stopped");
        });

        HeartbeatHandle {
            heartbeat: self,
            cancel,
            join,
        }
    }
}

/// Control handle for a running heartbeat.
pub struct HeartbeatHandle {
    heartbeat: Arc<Heartbeat>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Stop the timer. A cycle already running is allowed to finish.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Trigger a cycle now. `Ok(None)` when stopped or busy.
    pub async fn run_now(&self) -> Result<Option<CycleOutcome>> {
        if self.is_stopped() {
            return Ok(None);
        }
        self.heartbeat.tick().await
    }

    /// Wait for the loop (and any in-flight cycle) to end.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            warn!(error = %e, "heartbeat task ended abnormally");
        }
    }
}
