//! Audit event types and emission functions.

use crate::core::{JobId, JobState, ScanJob};
use crate::defender::SignatureUpdate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit record of one scan job at a point in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAuditEvent {
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,

    /// Job identifier.
    pub job_id: JobId,

    /// Scan kind.
    pub kind: String,

    /// Target path, for custom scans.
    pub target_path: Option<String>,

    /// State before this event, if it is a transition.
    pub from_state: Option<JobState>,

    /// State after this event.
    pub state: JobState,

    /// Engine job handle, if known.
    pub external_handle: Option<u32>,

    /// Failure cause, for failed and timed out jobs.
    pub failure_detail: Option<String>,

    /// Milliseconds since submission.
    pub elapsed_ms: i64,
}

impl JobAuditEvent {
    /// Captures `job` as it is now.
    pub fn from_job(job: &ScanJob, from_state: Option<JobState>) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job.job_id,
            kind: job.kind.to_string(),
            target_path: job.target_path.clone(),
            from_state,
            state: job.state,
            external_handle: job.external_handle.map(|handle| handle.get()),
            failure_detail: job.failure_detail.clone(),
            elapsed_ms: job.elapsed().num_milliseconds(),
        }
    }
}

impl AuditEvent for JobAuditEvent {
    fn event_type(&self) -> &'static str {
        if self.from_state.is_some() {
            "job_transition"
        } else {
            "job_submitted"
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for an accepted scan submission.
pub fn emit_job_submitted(job: &ScanJob) {
    tracing::info!(
        target: "defenderbridge::audit",
        event_type = "job_submitted",
        job_id = %job.job_id,
        kind = %job.kind,
        target_path = ?job.target_path,
        "Scan job submitted"
    );
}

/// Emits an audit event for a job state change.
pub fn emit_job_transition(job: &ScanJob, from: JobState) {
    tracing::info!(
        target: "defenderbridge::audit",
        event_type = "job_transition",
        job_id = %job.job_id,
        kind = %job.kind,
        from_state = %from,
        state = %job.state,
        external_handle = ?job.external_handle.map(|handle| handle.get()),
        confirmation = ?job.confirmation,
        failure_detail = ?job.failure_detail,
        elapsed_ms = job.elapsed().num_milliseconds(),
        "Scan job changed state"
    );
}

/// Emits an audit event for the engine accepting a scan start.
pub fn emit_job_accepted(job: &ScanJob) {
    tracing::info!(
        target: "defenderbridge::audit",
        event_type = "job_accepted",
        job_id = %job.job_id,
        external_handle = ?job.external_handle.map(|handle| handle.get()),
        "Engine accepted scan job"
    );
}

/// Emits an audit event for finished jobs removed by a sweep.
pub fn emit_jobs_evicted(evicted: &[JobId], remaining: usize) {
    if evicted.is_empty() {
        return;
    }
    tracing::info!(
        target: "defenderbridge::audit",
        event_type = "jobs_evicted",
        evicted = evicted.len(),
        remaining,
        job_ids = ?evicted,
        "Finished scan jobs evicted"
    );
}

/// Emits an audit event for a signature update attempt.
pub fn emit_signature_update(update: &SignatureUpdate) {
    tracing::info!(
        target: "defenderbridge::audit",
        event_type = "signature_update",
        success = update.success,
        previous_version = %update.previous_version,
        current_version = %update.current_version,
        error = ?update.error,
        "Signature update attempted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Confirmation, ExternalHandle};

    #[test]
    fn test_job_audit_event_from_job() {
        let mut job = ScanJob::custom("C:\\Data\\a.exe");
        let submitted = JobAuditEvent::from_job(&job, None);
        assert_eq!(submitted.event_type(), "job_submitted");
        assert_eq!(submitted.state, JobState::Queued);
        assert_eq!(submitted.target_path.as_deref(), Some("C:\\Data\\a.exe"));

        job.mark_running();
        job.record_handle(ExternalHandle::new(12));
        job.complete(Confirmation::ExternallyConfirmed);

        let finished = JobAuditEvent::from_job(&job, Some(JobState::Running));
        assert_eq!(finished.event_type(), "job_transition");
        assert_eq!(finished.external_handle, Some(12));

        let json = serde_json::to_value(&finished).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["from_state"], "running");
        assert_eq!(json["kind"], "CustomScan");
    }
}
