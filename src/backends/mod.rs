//! Command runner implementations.
//!
//! This module contains implementations of the `CommandRunner` trait, the
//! only way the rest of the library reaches the scanning engine.
//!
//! ## Available Runners
//!
//! - [`mock`] - A scripted runner for testing
//! - [`powershell`] - Windows PowerShell via temporary script files
//!   (requires the `powershell` feature)
//!
//! ## Implementing a Custom Runner
//!
//! ```rust,ignore
//! use defenderbridge::core::{CommandOutput, CommandRunner, RunnerError};
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! pub struct RemoteRunner {
//!     // Connection to a remote host
//! }
//!
//! #[async_trait]
//! impl CommandRunner for RemoteRunner {
//!     fn name(&self) -> &str {
//!         "remote"
//!     }
//!
//!     async fn run(&self, script: &str, timeout: Duration) -> Result<CommandOutput, RunnerError> {
//!         // Ship the script, enforce the timeout, collect output
//!         todo!()
//!     }
//! }
//! ```

pub mod mock;

#[cfg(feature = "powershell")]
pub mod powershell;

// Re-exports
pub use mock::{MockResponse, MockRunner};

#[cfg(feature = "powershell")]
pub use powershell::{PowerShellConfig, PowerShellRunner};
