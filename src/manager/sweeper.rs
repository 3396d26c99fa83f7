//! Periodic eviction of finished jobs.

use crate::audit;
use crate::core::JobId;
use crate::manager::registry::JobRegistry;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Evicts finished jobs older than `retention` and audits the removal.
pub fn sweep(registry: &JobRegistry, retention: Duration) -> Vec<JobId> {
    let evicted = registry.evict_older_than(retention);
    if !evicted.is_empty() {
        tracing::debug!(
            evicted = evicted.len(),
            retention_ms = retention.as_millis() as u64,
            "Swept finished scan jobs"
        );
    }
    audit::emit_jobs_evicted(&evicted, registry.len());
    evicted
}

/// Handle to a background sweep task. The task stops when this is dropped.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the sweep task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Returns `true` once the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts a task that sweeps `registry` every `interval`.
///
/// The first sweep happens one interval after the call.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn spawn_sweeper(
    registry: Arc<JobRegistry>,
    retention: Duration,
    interval: Duration,
) -> SweeperHandle {
    let period = interval.max(Duration::from_millis(1));
    tracing::debug!(
        retention_ms = retention.as_millis() as u64,
        interval_ms = period.as_millis() as u64,
        "Starting job sweeper"
    );

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep(&registry, retention);
        }
    });

    SweeperHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Confirmation, ScanJob};
    use chrono::Utc;

    fn finished(ago: chrono::Duration) -> ScanJob {
        let mut job = ScanJob::quick();
        job.mark_running();
        job.complete(Confirmation::InvocationAccepted);
        job.finished_at = Some(Utc::now() - ago);
        job
    }

    #[test]
    fn test_sweep() {
        let registry = JobRegistry::new();
        registry.put(finished(chrono::Duration::hours(2)));
        registry.put(finished(chrono::Duration::seconds(5)));
        registry.put(ScanJob::quick());

        let evicted = sweep(&registry, Duration::from_secs(3600));
        assert_eq!(evicted.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_periodically_and_stops_on_drop() {
        let registry = Arc::new(JobRegistry::new());
        let handle = spawn_sweeper(
            Arc::clone(&registry),
            Duration::from_secs(60),
            Duration::from_secs(10),
        );

        registry.put(finished(chrono::Duration::hours(1)));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(registry.is_empty());

        drop(handle);
        tokio::task::yield_now().await;

        registry.put(finished(chrono::Duration::hours(1)));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(registry.len(), 1);
    }
}
