//! # Defenderbridge
//!
//! Asynchronous scan-job orchestration over the Microsoft Defender
//! PowerShell cmdlets, with path validation, bounded concurrency and
//! structured audit logging.
//!
//! ## Overview
//!
//! Defender scans can run for many minutes. Defenderbridge turns each scan
//! request into a tracked job that callers poll instead of waiting on:
//!
//! - Validate scan targets against an allow-list before anything runs
//! - Queue scans in FIFO order behind a fixed concurrency cap
//! - Start scans as engine background jobs and reconcile their state on poll
//! - Read protection status, threats and detection history
//! - Update signatures, reporting the version before and after
//! - Evict finished jobs after a retention window
//! - Expose everything as named tools taking JSON arguments
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use defenderbridge::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DefenderError> {
//!     let service = DefenderService::builder()
//!         .with_config(DefenderConfig::from_env())
//!         .build()?;
//!     let _sweeper = service.spawn_sweeper();
//!
//!     let job = service.scan_path("C:\\Users\\Public\\Downloads")?;
//!     println!("queued {}", job.job_id);
//!
//!     if let Some(job) = service.poll_scan(&job.job_id).await {
//!         println!("{} is {}", job.job_id, job.state);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes the PowerShell runner
//! - `powershell` - Runs commands through `powershell.exe`
//!
//! ## Architecture
//!
//! - **Core**: Job types, the `CommandRunner` trait, and error handling
//! - **Backends**: Command runner implementations
//! - **Validation**: Path and text sanitization
//! - **Config**: Environment-driven settings
//! - **Manager**: Registry, queue, orchestrator and sweeper
//! - **Defender**: Stateless status, threat and signature queries
//! - **Service**: The facade tying it all together
//! - **Tools**: Named JSON tools over the service
//! - **Audit**: Structured logging of job lifecycle events

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod config;
pub mod core;
pub mod defender;
pub mod manager;
pub mod service;
pub mod tools;
pub mod validation;

// Re-export commonly used types at the crate root
pub use crate::core::{
    CommandOutput, CommandRunner, Confirmation, DefenderError, DefenderResult, ExternalHandle,
    JobId, JobState, QueueStats, RunnerError, ScanJob, ScanKind, ValidationError,
};

pub use crate::config::DefenderConfig;
pub use crate::service::{DefenderService, DefenderServiceBuilder};
pub use crate::tools::{DefenderTools, ToolDescriptor, ToolResponse};
pub use crate::validation::{AllowList, PathValidator};

/// Prelude module for convenient imports.
///
/// ```rust
/// use defenderbridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backends::{MockResponse, MockRunner};
    pub use crate::config::DefenderConfig;
    pub use crate::core::{
        CommandOutput, CommandRunner, Confirmation, DefenderError, DefenderResult, JobId,
        JobState, QueueStats, ScanJob, ScanKind,
    };
    pub use crate::service::{DefenderService, DefenderServiceBuilder};
    pub use crate::tools::{DefenderTools, ToolResponse};
    pub use crate::validation::{AllowList, PathValidator};
}
