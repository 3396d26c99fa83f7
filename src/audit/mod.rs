//! Structured audit logging for scan jobs.
//!
//! This module provides functions for emitting structured audit events
//! using the `tracing` crate under the `defenderbridge::audit` target.
//! Events can be captured by any tracing subscriber (JSON file,
//! OpenTelemetry, etc.) for tamper-resistant logging.

mod events;

pub use events::{
    emit_job_accepted, emit_job_submitted, emit_job_transition, emit_jobs_evicted,
    emit_signature_update, AuditEvent, JobAuditEvent,
};
