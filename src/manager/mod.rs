//! Scan job management.
//!
//! The pieces that track scans whose real work happens inside the engine:
//!
//! - [`JobRegistry`] - The only owner of job records
//! - [`ScanQueue`] - Bounded-concurrency admission of start commands
//! - [`ScanOrchestrator`] - The job lifecycle and engine reconciliation
//! - [`spawn_sweeper`] - Periodic eviction of finished jobs

mod orchestrator;
mod queue;
mod registry;
pub mod scripts;
mod sweeper;

pub use orchestrator::{ExternalJobState, ScanOrchestrator};
pub use queue::ScanQueue;
pub use registry::JobRegistry;
pub use sweeper::{spawn_sweeper, sweep, SweeperHandle};
