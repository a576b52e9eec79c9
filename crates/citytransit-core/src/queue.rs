//! Bounded concurrency queue for the v3 API generation.
//!
//! The v3 upstream returns server errors under moderate concurrency, so
//! every v3 call runs under a hard ceiling of concurrent executions.
//! Admission is FIFO; completion order is unconstrained, and one task's
//! failure releases its slot for the next waiter.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Hard ceiling of concurrently executing v3 requests.
pub const V3_CONCURRENCY: usize = 3;

/// FIFO-admission queue with a fixed concurrency ceiling.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl RequestQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// The queue guarding the fragile v3 generation.
    pub fn v3() -> Self {
        Self::new(V3_CONCURRENCY)
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Currently free execution slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run a task once a slot frees up. The slot is held for the task's
    /// whole execution and released on completion, success or failure.
    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("request queue semaphore is never closed");
        task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn ceiling_is_never_exceeded() {
        let queue = RequestQueue::v3();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let queue = queue.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                queue
                    .run(async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }

        for handle in handles {
            handle.await.expect("task completes");
        }

        assert!(peak.load(Ordering::SeqCst) <= V3_CONCURRENCY);
        assert_eq!(queue.available(), V3_CONCURRENCY);
    }

    #[tokio::test]
    async fn failure_releases_the_slot() {
        let queue = RequestQueue::new(1);

        let outcome: Result<(), &str> = queue.run(async { Err("upstream 500") }).await;
        assert!(outcome.is_err());

        // The slot freed despite the failure.
        let outcome: Result<(), &str> = queue.run(async { Ok(()) }).await;
        assert!(outcome.is_ok());
    }
}
