//! Core types used throughout the defenderbridge library.
//!
//! This module defines the scan job record and the small value types it is
//! built from: job identifiers, external handles, scan kinds and states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of a tracked scan job.
///
/// Assigned once at submission and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Identifier the engine assigned to an in-flight background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalHandle(u32);

impl ExternalHandle {
    /// Wraps a raw engine job id.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw engine job id.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Parses the handle printed by a scan start command.
    ///
    /// Only the last non-empty line is considered, since cmdlets may print
    /// progress or warnings first.
    pub fn parse_output(output: &str) -> Option<Self> {
        output
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .and_then(|line| line.parse::<u32>().ok())
            .map(Self)
    }
}

impl fmt::Display for ExternalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of scan requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanKind {
    /// Scan of a caller-supplied file or directory.
    CustomScan,
    /// Quick system-wide scan.
    QuickScan,
}

impl ScanKind {
    /// Returns the engine's name for this scan type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomScan => "CustomScan",
            Self::QuickScan => "QuickScan",
        }
    }

    /// Returns `true` if this kind requires a target path.
    pub fn requires_path(&self) -> bool {
        matches!(self, Self::CustomScan)
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a scan job.
///
/// States only move forward: `Queued → Running → {Completed | Failed | Timeout}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, waiting for a queue slot.
    Queued,
    /// Local task executing, or the engine is still working on it.
    Running,
    /// Finished successfully. See [`Confirmation`] for what that means.
    Completed,
    /// Finished with an error.
    Failed,
    /// The engine command exceeded its time bound.
    Timeout,
}

impl JobState {
    /// Returns `true` for `Completed`, `Failed` and `Timeout`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }

    /// Returns `true` if a job in this state may move to `next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match self {
            Self::Queued => matches!(next, Self::Running),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Timeout => false,
        }
    }

    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a `Completed` job actually guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// The engine accepted the scan request but returned no handle, so the
    /// scan's own outcome cannot be observed.
    InvocationAccepted,
    /// The engine reported that its background job finished.
    ExternallyConfirmed,
}

/// The tracking record for one submitted scan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    /// Identifier used for polling.
    pub job_id: JobId,

    /// Kind of scan.
    pub kind: ScanKind,

    /// Normalized target path; only set for `CustomScan`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,

    /// Current lifecycle state.
    pub state: JobState,

    /// Engine job handle, once the scan start was accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_handle: Option<ExternalHandle>,

    /// When the job was submitted.
    pub submitted_at: DateTime<Utc>,

    /// When the local task began executing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the engine accepted the scan start command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Meaning of a `Completed` state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Confirmation>,

    /// Human-readable cause for `Failed` and `Timeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

impl ScanJob {
    /// Creates a queued job.
    pub fn new(kind: ScanKind, target_path: Option<String>) -> Self {
        Self {
            job_id: JobId::new(),
            kind,
            target_path,
            state: JobState::Queued,
            external_handle: None,
            submitted_at: Utc::now(),
            started_at: None,
            accepted_at: None,
            finished_at: None,
            confirmation: None,
            failure_detail: None,
        }
    }

    /// Creates a queued custom scan of `path`.
    pub fn custom(path: impl Into<String>) -> Self {
        Self::new(ScanKind::CustomScan, Some(path.into()))
    }

    /// Creates a queued quick scan.
    pub fn quick() -> Self {
        Self::new(ScanKind::QuickScan, None)
    }

    /// Returns `true` once the job has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves a queued job to `Running`.
    ///
    /// Returns `false` and leaves the job untouched for any other state.
    pub fn mark_running(&mut self) -> bool {
        if !self.state.can_transition_to(JobState::Running) {
            return false;
        }
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Records the engine handle of a running job. Set at most once.
    pub fn record_handle(&mut self, handle: ExternalHandle) -> bool {
        if self.state != JobState::Running || self.external_handle.is_some() {
            return false;
        }
        self.external_handle = Some(handle);
        self.accepted_at = Some(Utc::now());
        true
    }

    /// Moves a running job to `Completed`.
    pub fn complete(&mut self, confirmation: Confirmation) -> bool {
        if !self.finish(JobState::Completed) {
            return false;
        }
        self.confirmation = Some(confirmation);
        if confirmation == Confirmation::InvocationAccepted && self.accepted_at.is_none() {
            self.accepted_at = self.finished_at;
        }
        true
    }

    /// Moves a running job to `Failed` with the given cause.
    pub fn fail(&mut self, detail: impl Into<String>) -> bool {
        self.finish_with_detail(JobState::Failed, detail.into())
    }

    /// Moves a running job to `Timeout` with the given cause.
    pub fn time_out(&mut self, detail: impl Into<String>) -> bool {
        self.finish_with_detail(JobState::Timeout, detail.into())
    }

    /// Wall-clock time from submission to finish (or to now, while active).
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.submitted_at
    }

    fn finish_with_detail(&mut self, state: JobState, detail: String) -> bool {
        let detail = if detail.trim().is_empty() {
            format!("scan {state} without further detail")
        } else {
            detail
        };
        if !self.finish(state) {
            return false;
        }
        self.failure_detail = Some(detail);
        true
    }

    fn finish(&mut self, state: JobState) -> bool {
        if !self.state.can_transition_to(state) {
            return false;
        }
        self.state = state;
        self.finished_at = Some(Utc::now());
        true
    }
}

/// Live snapshot of the scan queue.
///
/// Fields are read independently and are not a consistent multi-field view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Tasks currently executing.
    pub running: usize,
    /// Tasks waiting for a slot.
    pub queued: usize,
    /// Job records currently held by the registry.
    pub total_tracked: usize,
}
