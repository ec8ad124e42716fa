//! Bounded fan-out onto the tokio runtime.
//!
//! Every future gets its own task, so a panic is contained to the slot that
//! raised it. A semaphore caps how many of those tasks make progress at once.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

const DEFAULT_LIMIT: usize = 32;

/// Fan-out limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    max_concurrency: NonZeroUsize,
}

impl SchedulerConfig {
    /// Limits fan-out to `max_concurrency` running tasks.
    #[must_use]
    pub const fn new(max_concurrency: NonZeroUsize) -> Self {
        Self { max_concurrency }
    }

    /// Returns the limit.
    #[must_use]
    pub const fn max_concurrency(self) -> NonZeroUsize {
        self.max_concurrency
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_LIMIT).unwrap_or(NonZeroUsize::MIN))
    }
}

/// Spawns futures under a shared concurrency limit.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    permits: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrency().get())),
            closed: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Returns `true` once [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops admitting work. Tasks still waiting for a permit resolve to
    /// [`SchedulerError::Closed`]; running tasks finish normally.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.permits.close();
    }

    /// Spawns `future` on its own task; it starts once a permit is free.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Closed`] if the scheduler is already closed.
    pub fn spawn<F, T>(&self, future: F) -> SchedulerResult<JoinHandle<SchedulerResult<T>>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(SchedulerError::Closed);
        }

        let permits = Arc::clone(&self.permits);
        Ok(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return Err(SchedulerError::Closed);
            };
            Ok(future.await)
        }))
    }

    /// Spawns every future before awaiting any, then joins them all.
    ///
    /// Slot `k` of the result holds the outcome of future `k`, whatever order
    /// the tasks finished in. A task that panics or is cancelled fails only its
    /// own slot.
    pub async fn run_all<I, F, T>(&self, futures: I) -> Vec<SchedulerResult<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let spawned: Vec<_> = futures.into_iter().map(|future| self.spawn(future)).collect();
        debug!(
            tasks = spawned.len(),
            limit = self.config.max_concurrency().get(),
            "fan-out started"
        );

        join_all(spawned.into_iter().map(|spawned| async move {
            match spawned {
                Ok(handle) => handle.await.unwrap_or_else(|err| Err(SchedulerError::from(err))),
                Err(err) => Err(err),
            }
        }))
        .await
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Reasons a scheduled task produced no output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler was closed before the task could run.
    #[error("scheduler closed")]
    Closed,
    /// The task panicked.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },
    /// The task was cancelled by the runtime.
    #[error("task cancelled")]
    Cancelled,
}

impl From<JoinError> for SchedulerError {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            return Self::Cancelled;
        }
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Panicked { message }
    }
}

/// Result alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
