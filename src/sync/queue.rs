//! Serialized operation queue.
//!
//! Every filesystem and git operation against the local clone goes through a
//! single worker task, so operations run one at a time in enqueue order and
//! each one observes the effects of everything enqueued before it. A failing
//! or panicking operation only fails its own caller.

use crate::error::{NautilusError, Result};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Handle to the single-worker operation queue. Cheap to clone.
#[derive(Clone)]
pub struct OperationQueue {
    job_tx: mpsc::UnboundedSender<Job>,
}

impl OperationQueue {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// The worker exits once every handle has been dropped and the
    /// remaining jobs have drained.
    pub fn spawn() -> Self {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                if AssertUnwindSafe(job()).catch_unwind().await.is_err() {
                    error!("queued operation panicked; continuing with next operation");
                }
            }
            debug!("operation queue drained, worker exiting");
        });
        Self { job_tx }
    }

    /// Run `op` after all previously enqueued operations and return its outcome.
    ///
    /// The position in the queue is fixed when this is called, not when the
    /// returned future is first polled.
    pub fn enqueue<T, F, Fut>(&self, op: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let outcome = op().await;
                let _ = reply_tx.send(outcome);
            }
            .boxed()
        });
        let accepted = self.job_tx.send(job).is_ok();

        async move {
            if !accepted {
                return Err(NautilusError::QueueClosed);
            }
            // A dropped sender means the operation panicked before replying.
            reply_rx.await.map_err(|_| NautilusError::QueueClosed)?
        }
    }
}
