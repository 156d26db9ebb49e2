//! Bounded-concurrency worker pool.
//!
//! The pool owns a fixed number of execution slots. `submit` blocks until
//! a slot frees up, runs the unit of work under a per-unit deadline, and
//! hands back a [`PoolHandle`] whose result is delivered asynchronously.
//! Panics are caught at the pool boundary and converted into typed errors;
//! a unit that outlives its deadline is abandoned, not killed, and keeps
//! occupying its slot until it actually returns, so the concurrency bound
//! is never violated.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinError;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default number of worker slots.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Errors produced at the pool boundary.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// The pool is draining and accepts no new submissions.
    #[error("worker pool is closed")]
    Closed,

    /// The unit exceeded its deadline and was abandoned.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The unit panicked; the payload text was captured.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The run was cancelled before the unit was dispatched.
    #[error("task cancelled")]
    Cancelled,
}

/// Handle to a submitted unit. `join` yields the unit's output in
/// submission order semantics: callers that join handles in the order they
/// submitted get results indexed by submission, not completion.
pub struct PoolHandle<T> {
    handle: tokio::task::JoinHandle<Result<T, PoolError>>,
}

impl<T> PoolHandle<T> {
    /// Wait for the unit to finish, time out, or fail.
    pub async fn join(self) -> Result<T, PoolError> {
        match self.handle.await {
            Ok(result) => result,
            // The supervising task does not panic itself; a join error here
            // still maps to the panic variant to keep the boundary typed.
            Err(err) => Err(PoolError::Panicked(panic_message(err))),
        }
    }
}

/// Fixed-capacity concurrency primitive.
pub struct WorkerPool {
    max_workers: usize,
    slots: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    /// Signalled when the last in-flight handle settles.
    drained: Arc<Notify>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool with the given number of slots.
    pub fn new(max_workers: usize, cancel: CancellationToken) -> Self {
        Self {
            max_workers,
            slots: Arc::new(Semaphore::new(max_workers)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
            cancel,
        }
    }

    /// The concurrency bound.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Currently free slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Units submitted whose handles have not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Submit a unit of work.
    ///
    /// Blocks until a slot is available. Fails with [`PoolError::Closed`]
    /// once [`shutdown`](Self::shutdown) has been called and with
    /// [`PoolError::Cancelled`] when the cancellation token fires before
    /// dispatch. The returned handle settles with the unit's output, a
    /// timeout, or a captured panic.
    pub async fn submit<F, T>(&self, work: F, deadline: Duration) -> Result<PoolHandle<T>, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let permit = tokio::select! {
            permit = Arc::clone(&self.slots).acquire_owned() => {
                permit.map_err(|_| PoolError::Closed)?
            }
            _ = self.cancel.cancelled() => return Err(PoolError::Cancelled),
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let in_flight = Arc::clone(&self.in_flight);
        let drained = Arc::clone(&self.drained);

        // The permit rides inside the inner task: an abandoned unit keeps
        // its slot until it actually returns.
        let mut inner = tokio::spawn(async move {
            let _permit = permit;
            work.await
        });

        let handle = tokio::spawn(async move {
            let result = match timeout(deadline, &mut inner).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(join_err)) => {
                    if join_err.is_panic() {
                        let message = panic_message(join_err);
                        warn!(panic = %message, "task panicked, contained at pool boundary");
                        Err(PoolError::Panicked(message))
                    } else {
                        Err(PoolError::Cancelled)
                    }
                }
                Err(_) => {
                    warn!(deadline_ms = %deadline.as_millis(), "task exceeded deadline, abandoning");
                    Err(PoolError::Timeout(deadline))
                }
            };
            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
            result
        });

        Ok(PoolHandle { handle })
    }

    /// Stop accepting submissions and wait for in-flight units to finish
    /// or time out.
    pub async fn shutdown(&self) {
        self.slots.close();
        loop {
            // Register before re-checking the count so a settle racing
            // this loop cannot be missed.
            let drained = self.drained.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            drained.await;
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS, CancellationToken::new())
    }
}

/// Extract a readable message from a panic payload.
fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "unknown panic payload".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}
