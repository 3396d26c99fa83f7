//! In-memory job store.

use crate::core::{JobId, ScanJob};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// The single owner of job records.
///
/// Writers replace whole records keyed by id; readers get clones. Nothing
/// here blocks beyond a short lock hold and nothing fails except a lookup
/// of an unknown id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, ScanJob>>,
}

impl JobRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a record. Last writer wins.
    pub fn put(&self, job: ScanJob) {
        self.jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job.job_id, job);
    }

    /// Returns a copy of the record for `job_id`.
    pub fn get(&self, job_id: &JobId) -> Option<ScanJob> {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(job_id)
            .cloned()
    }

    /// Returns a snapshot of every record, in no particular order.
    pub fn list_all(&self) -> Vec<ScanJob> {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Applies `f` to the record for `job_id` under the write lock.
    ///
    /// Returns the record after `f` ran, or `None` for an unknown id.
    pub fn update<F>(&self, job_id: &JobId, f: F) -> Option<ScanJob>
    where
        F: FnOnce(&mut ScanJob),
    {
        let mut jobs = self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let job = jobs.get_mut(job_id)?;
        f(job);
        Some(job.clone())
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns `true` if no records are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes terminal records that finished more than `max_age` ago.
    ///
    /// Non-terminal records are never removed. Returns the evicted ids.
    pub fn evict_older_than(&self, max_age: Duration) -> Vec<JobId> {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.evict_finished_before(cutoff)
    }

    /// Removes terminal records whose finish time precedes `cutoff`.
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        let mut jobs = self
            .jobs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.is_finished())
            .filter(|job| job.finished_at.is_some_and(|at| at < cutoff))
            .map(|job| job.job_id)
            .collect();

        for id in &expired {
            jobs.remove(id);
        }
        expired
    }
}
