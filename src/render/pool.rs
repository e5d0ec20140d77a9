//! Bounded pool for CPU-bound render work.
//!
//! Each job holds a semaphore permit for its whole lifetime on tokio's
//! blocking thread pool, so at most `size` decode/resize/encode jobs run at
//! once and none of them occupy an async worker thread.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task;
use tracing::trace;

use crate::error::RenderError;

/// Fixed-size gate in front of `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs concurrently.
    ///
    /// A size of 0 means "one per available CPU".
    pub fn new(size: usize) -> Self {
        let size = if size == 0 { default_pool_size() } else { size };
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Maximum number of concurrent jobs.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of jobs that could start right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a permit is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T, RenderError>
    where
        F: FnOnce() -> Result<T, RenderError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| RenderError::Worker {
                message: "worker pool is closed".to_string(),
            })?;

        trace!(available = self.permits.available_permits(), "render job started");

        task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| RenderError::Worker {
            message: e.to_string(),
        })?
    }

    /// Stop accepting new jobs. Jobs already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(0)
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
