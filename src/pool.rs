//! Worker pool bounding CPU-heavy work.

use std::future::Future;

use tokio::sync::Semaphore;

/// Bounded pool shared by every render, synthesis and mux call of a job.
pub struct WorkerPool {
    permits: Semaphore,
    /// Resolved size, never zero.
    size: usize,
}

impl WorkerPool {
    /// `size == 0` means one worker per available execution unit.
    pub fn new(size: usize) -> Self {
        let size = if size == 0 { default_size() } else { size };
        Self {
            permits: Semaphore::new(size),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `work` once a worker slot is free.
    pub async fn run<T>(&self, work: impl Future<Output = T>) -> T {
        // The semaphore is never closed, so acquire only fails if that changes.
        let _permit = self.permits.acquire().await.ok();
        work.await
    }
}

pub fn default_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
