//! Core types and traits for the defenderbridge library.
//!
//! This module provides the fundamental building blocks used throughout
//! the library:
//!
//! - [`types`] - Job records, identifiers, states and queue statistics
//! - [`traits`] - The `CommandRunner` trait and its output type
//! - [`error`] - Structured error types

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types at the core level
pub use error::{DefenderError, DefenderResult, RunnerError, RunnerResult, ValidationError};
pub use traits::{ArcRunner, CommandOutput, CommandRunner};
pub use types::{Confirmation, ExternalHandle, JobId, JobState, QueueStats, ScanJob, ScanKind};
