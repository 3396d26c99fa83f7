//! Stateless engine queries.
//!
//! Each reader sends one or a few commands through a `CommandRunner` and
//! decodes the result. None of them touch the job registry.
//!
//! - [`read_computer_status`] - Protection and signature status
//! - [`read_threats`] / [`read_threat_detections`] - Threat history
//! - [`update_signatures`] - Signature update with before/after versions
//! - [`codes`] - Display names for the engine's numeric codes

pub mod codes;
mod json;
mod signatures;
mod status;
mod threats;

pub use json::parse_timestamp;
pub use signatures::{update_signatures, SignatureUpdate};
pub use status::{read_computer_status, read_signature_version, ComputerStatus};
pub use threats::{read_threat_detections, read_threats, ThreatDetection, ThreatRecord};
