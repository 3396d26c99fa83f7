//! Core traits for the defenderbridge library.
//!
//! This module defines the `CommandRunner` trait that every way of reaching
//! the scanning engine must implement.

use crate::core::error::RunnerError;

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Captured result of a successful command run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, decoded lossily as UTF-8.
    pub stdout: String,
    /// Standard error, decoded lossily as UTF-8.
    pub stderr: String,
    /// Exit code of the interpreter, if it exited normally.
    pub exit_code: Option<i32>,
    /// How long the command took.
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Creates an output with only standard output set.
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// Returns standard output with surrounding whitespace removed.
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Executes one engine script with a hard time bound.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync`; the scan queue calls them from
///   spawned tasks.
/// - On timeout the spawned process must be terminated and reaped before
///   `run` returns, and any temporary files must be released.
/// - A run that exits successfully but writes to its error stream is a
///   failure (`RunnerError::ErrorOutput`).
/// - Implementations should never panic; all errors are returned as
///   `RunnerError`.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use defenderbridge::core::{CommandOutput, CommandRunner, RunnerError};
/// use async_trait::async_trait;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct EchoRunner;
///
/// #[async_trait]
/// impl CommandRunner for EchoRunner {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn run(&self, script: &str, _timeout: Duration) -> Result<CommandOutput, RunnerError> {
///         Ok(CommandOutput::from_stdout(script))
///     }
/// }
/// ```
#[async_trait]
pub trait CommandRunner: Send + Sync + Debug {
    /// Returns a short, stable name for logs.
    fn name(&self) -> &str;

    /// Runs `script` and returns its captured output.
    ///
    /// # Errors
    ///
    /// - `Timeout` - The script ran longer than `timeout`; it was killed.
    /// - `NonZeroExit` - The interpreter exited with a failure status.
    /// - `ErrorOutput` - The interpreter exited cleanly but reported errors.
    /// - `Spawn` - The interpreter could not be started.
    async fn run(&self, script: &str, timeout: Duration) -> Result<CommandOutput, RunnerError>;
}

/// An arc-wrapped runner for shared ownership.
pub type ArcRunner = Arc<dyn CommandRunner>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_trimmed() {
        let output = CommandOutput::from_stdout("  7\r\n");
        assert_eq!(output.trimmed(), "7");
        assert_eq!(output.exit_code, Some(0));
        assert!(output.stderr.is_empty());
    }
}
