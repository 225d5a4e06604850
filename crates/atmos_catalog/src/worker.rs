//! Bounded fire-and-forget worker pool.

use crate::error::{CatalogError, CatalogResult};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};

#[derive(Debug)]
struct Shared {
    permits: Arc<Semaphore>,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count even if the task panics.
struct InFlight(Arc<Shared>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Runs request work off the dispatch loop.
///
/// Tasks are detached: results are delivered through the response cache,
/// never through a join handle. At most `workers` tasks run at once; the
/// rest wait for a permit.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    handle: Handle,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Creates a pool on `handle`.
    pub fn new(handle: Handle, workers: usize) -> Self {
        Self {
            handle,
            shared: Arc::new(Shared {
                permits: Arc::new(Semaphore::new(workers.max(1))),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Creates a pool on the current tokio runtime.
    pub fn current(workers: usize) -> CatalogResult<Self> {
        let handle = Handle::try_current().map_err(|e| CatalogError::Runtime(e.to_string()))?;
        Ok(Self::new(handle, workers))
    }

    /// Queues `task`. Never blocks the caller.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlight(Arc::clone(&self.shared));
        let permits = Arc::clone(&self.shared.permits);
        self.handle.spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    /// Returns the number of queued or running tasks.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Waits until no task is queued or running.
    pub async fn idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_waits_for_all_tasks() {
        let pool = WorkerPool::current(2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = Arc::clone(&done);
            pool.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let pool = WorkerPool::current(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        pool.idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn idle_on_empty_pool_returns() {
        let pool = WorkerPool::current(1).unwrap();
        pool.idle().await;
    }

    #[test]
    fn requires_runtime() {
        assert!(matches!(WorkerPool::current(1), Err(CatalogError::Runtime(_))));
    }
}
