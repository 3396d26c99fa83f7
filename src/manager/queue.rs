//! Bounded-concurrency admission control for background scan tasks.

use crate::core::{JobId, QueueStats};
use crate::manager::registry::JobRegistry;

use futures::FutureExt;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct PendingTask {
    job_id: JobId,
    task: BoxTask,
}

struct QueueInner {
    max_concurrent: usize,
    permits: Arc<Semaphore>,
    waiting: Mutex<VecDeque<PendingTask>>,
    registry: Arc<JobRegistry>,
}

/// Runs submitted tasks with at most `max_concurrent` executing at once.
///
/// Tasks that cannot start immediately wait in strict submission order. A
/// finishing task hands its slot straight to the oldest waiter, so a burst
/// can never push the number of executing tasks over the cap.
///
/// The queue never looks inside a task. Tasks record their own outcome in
/// the [`JobRegistry`]; a task that panics is logged and counted as done.
///
/// `ScanQueue` is a cheap handle; clones share the same slots and registry.
///
/// # Examples
///
/// ```rust,no_run
/// use defenderbridge::core::JobId;
/// use defenderbridge::manager::ScanQueue;
///
/// # async fn example() {
/// let queue = ScanQueue::new(2);
/// queue.submit(JobId::new(), async {
///     // start the external scan
/// });
/// println!("{:?}", queue.stats());
/// # }
/// ```
#[derive(Clone)]
pub struct ScanQueue {
    inner: Arc<QueueInner>,
}

impl ScanQueue {
    /// Creates a queue with its own registry. A cap of 0 is raised to 1.
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_registry(max_concurrent, Arc::new(JobRegistry::new()))
    }

    /// Creates a queue over an existing registry.
    pub fn with_registry(max_concurrent: usize, registry: Arc<JobRegistry>) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            inner: Arc::new(QueueInner {
                max_concurrent,
                permits: Arc::new(Semaphore::new(max_concurrent)),
                waiting: Mutex::new(VecDeque::new()),
                registry,
            }),
        }
    }

    /// Returns the registry the queue reports on.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.inner.registry
    }

    /// Accepts a task for `job_id`.
    ///
    /// Starts it now if a slot is free and nobody is waiting, otherwise puts
    /// it at the back of the wait list. Never blocks and never fails.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn submit<F>(&self, job_id: JobId, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pending = PendingTask {
            job_id,
            task: Box::pin(task),
        };

        let mut waiting = self.inner.lock_waiting();
        if waiting.is_empty() {
            if let Ok(permit) = Arc::clone(&self.inner.permits).try_acquire_owned() {
                drop(waiting);
                tracing::debug!(job_id = %job_id, "Scan task admitted");
                tokio::spawn(drive(Arc::clone(&self.inner), permit, pending));
                return;
            }
        }

        waiting.push_back(pending);
        tracing::debug!(
            job_id = %job_id,
            position = waiting.len(),
            "Scan task waiting for a free slot"
        );
    }

    /// Returns a live snapshot of the queue.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            running: self.running(),
            queued: self.queued(),
            total_tracked: self.inner.registry.len(),
        }
    }

    /// Number of tasks currently executing.
    pub fn running(&self) -> usize {
        self.inner.max_concurrent - self.inner.permits.available_permits()
    }

    /// Number of tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.lock_waiting().len()
    }

    /// The concurrency cap.
    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Returns `true` if every slot is taken.
    pub fn is_full(&self) -> bool {
        self.inner.permits.available_permits() == 0
    }

    /// Evicts finished jobs older than `max_age` from the registry.
    pub fn cleanup(&self, max_age: Duration) -> Vec<JobId> {
        self.inner.registry.evict_older_than(max_age)
    }
}

impl fmt::Debug for ScanQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanQueue")
            .field("max_concurrent", &self.max_concurrent())
            .field("running", &self.running())
            .field("queued", &self.queued())
            .finish()
    }
}

impl QueueInner {
    fn lock_waiting(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingTask>> {
        self.waiting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs `first`, then keeps the slot busy with waiters until none are left.
async fn drive(inner: Arc<QueueInner>, permit: OwnedSemaphorePermit, first: PendingTask) {
    let mut next = first;
    loop {
        let PendingTask { job_id, task } = next;

        if AssertUnwindSafe(task).catch_unwind().await.is_err() {
            tracing::warn!(job_id = %job_id, "Scan task panicked; releasing its slot");
        }

        next = {
            let mut waiting = inner.lock_waiting();
            match waiting.pop_front() {
                Some(pending) => pending,
                None => {
                    // Released under the lock so a concurrent submit cannot
                    // enqueue behind a slot that is about to free up.
                    drop(permit);
                    return;
                }
            }
        };
        tracing::debug!(job_id = %next.job_id, "Scan task admitted from wait list");
    }
}
