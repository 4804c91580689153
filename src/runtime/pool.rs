//! Bounded pool for blocking inference jobs.
//!
//! Jobs run on tokio's blocking threads; a semaphore caps how many run at
//! once so a burst of requests queues instead of oversubscribing the model.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{DiaryError, Result};

#[derive(Clone, Debug)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl BlockingPool {
    /// `max_jobs` is clamped to at least one.
    pub fn new(max_jobs: usize) -> Self {
        let capacity = max_jobs.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run `job` off the async executor and wait for it.
    ///
    /// The calling task suspends until a slot frees up and the job finishes.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| DiaryError::Inference(format!("worker pool closed: {e}")))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| DiaryError::Inference(format!("worker task failed: {e}")))?
    }
}
