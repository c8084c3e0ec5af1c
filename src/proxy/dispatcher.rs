//! Concurrency-bounded dispatcher
//!
//! Every probe runs under a permit from one shared semaphore, so no more than
//! `capacity` probes are in flight at once regardless of protocol. Blocking
//! probes additionally run on a [`WorkerPool`] of the same size. Permits are
//! RAII guards and are returned on every exit path, including worker panics.

use crate::proxy::models::ProbeFailure;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatcher semaphore closed")]
    Closed,
    #[error("worker failed: {0}")]
    WorkerFault(String),
}

impl From<DispatchError> for ProbeFailure {
    fn from(e: DispatchError) -> Self {
        ProbeFailure::WorkerFault(e.to_string())
    }
}

/// Bounded pool of OS threads for blocking jobs
#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(size)),
        }
    }

    /// Run `job` on a blocking thread once a slot is free.
    ///
    /// The slot travels with the job, so it is held until the thread is done
    /// even if the caller stops waiting.
    pub async fn run<F, T>(&self, job: F) -> Result<T, DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Closed)?;

        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            job()
        })
        .await
        .map_err(|e| DispatchError::WorkerFault(e.to_string()))
    }
}

/// Shared gate every probe passes through
#[derive(Debug, Clone)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    workers: WorkerPool,
    capacity: usize,
}

impl Dispatcher {
    /// Create a dispatcher allowing `capacity` concurrent probes
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            workers: WorkerPool::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Probes currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Await `work` while holding a permit
    pub async fn run_bounded<F>(&self, work: F) -> Result<F::Output, DispatchError>
    where
        F: Future,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DispatchError::Closed)?;
        Ok(work.await)
    }

    /// Run blocking `job` on the worker pool while holding a permit
    pub async fn run_blocking<F, T>(&self, job: F) -> Result<T, DispatchError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DispatchError::Closed)?;
        self.workers.run(job).await
    }
}
