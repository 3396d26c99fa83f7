//! Error types for the defenderbridge library.
//!
//! Each concern gets its own typed error: the command runner, path
//! validation, and the service-level taxonomy that callers see. The library
//! never panics on bad input; all failures are returned as `Result` values.

use crate::core::types::ExternalHandle;

use std::time::Duration;
use thiserror::Error;

/// Failure of a single external command invocation.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The command exceeded its wall-clock bound and was terminated.
    #[error("command timed out after {elapsed:?}")]
    Timeout {
        /// How long the command ran before it was killed.
        elapsed: Duration,
    },

    /// The command exited with a non-zero status.
    #[error("command exited with code {code:?}: {stderr}")]
    NonZeroExit {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured error stream.
        stderr: String,
    },

    /// The command exited successfully but wrote to its error stream.
    ///
    /// PowerShell reports non-terminating cmdlet errors this way.
    #[error("command reported errors: {stderr}")]
    ErrorOutput {
        /// Captured error stream.
        stderr: String,
    },

    /// The interpreter process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that was being started.
        program: String,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred while preparing or collecting the command.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Creates a `Timeout` error.
    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    /// Creates a `NonZeroExit` error.
    pub fn non_zero_exit(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::NonZeroExit {
            code,
            stderr: stderr.into(),
        }
    }

    /// Returns `true` if the command was killed for exceeding its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the most specific human-readable cause.
    ///
    /// Text the command wrote to its error stream is preferred over the
    /// generic rendering of the variant.
    pub fn detail(&self) -> String {
        match self {
            Self::NonZeroExit { stderr, .. } | Self::ErrorOutput { stderr }
                if !stderr.trim().is_empty() =>
            {
                stderr.trim().to_string()
            }
            Self::NonZeroExit { code, .. } => match code {
                Some(code) => format!("command failed with exit code {code}"),
                None => "command was terminated by a signal".to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Reason a caller-supplied path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No path was given, or it was blank.
    #[error("path is required and cannot be empty")]
    Empty,

    /// The path is not absolute.
    #[error("path must be absolute: {path}")]
    NotAbsolute {
        /// The offending path.
        path: String,
    },

    /// The path contains a parent-directory component.
    #[error("path traversal is not allowed: {path}")]
    Traversal {
        /// The offending path.
        path: String,
    },

    /// The path names a network share or device namespace.
    #[error("UNC paths are not allowed: {path}")]
    UncRejected {
        /// The offending path.
        path: String,
    },

    /// The path contains a NUL byte.
    #[error("path contains null bytes")]
    NullByte,

    /// The path is longer than the engine accepts.
    #[error("path length {len} exceeds maximum {max}")]
    TooLong {
        /// Length of the supplied path in characters.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The path is outside every configured scan root.
    #[error("path is not in allowed directories ({allowed}): {path}")]
    OutsideAllowList {
        /// The normalized path.
        path: String,
        /// Comma-separated list of allowed roots.
        allowed: String,
    },
}

/// The error type surfaced by the service and tool layers.
#[derive(Debug, Error)]
pub enum DefenderError {
    /// The request was rejected before any external call was made.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// An external command failed to start or returned an error.
    #[error("engine command failed: {0}")]
    Invocation(RunnerError),

    /// An external command exceeded its time bound.
    #[error("engine command timed out after {elapsed:?}")]
    Timeout {
        /// How long the command ran before it was killed.
        elapsed: Duration,
    },

    /// A follow-up query for an external job failed.
    #[error("could not reconcile external job {handle}: {reason}")]
    Reconciliation {
        /// Handle of the external job.
        handle: ExternalHandle,
        /// Why the query failed.
        reason: String,
    },

    /// Engine output could not be decoded.
    #[error("could not decode output of '{command}': {message}")]
    Decode {
        /// Short name of the command whose output was malformed.
        command: String,
        /// Decoder message.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl DefenderError {
    /// Creates a `Decode` error.
    pub fn decode(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller can fix the request and try again.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns `true` if this error came from an exceeded time bound.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<RunnerError> for DefenderError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Timeout { elapsed } => Self::Timeout { elapsed },
            other => Self::Invocation(other),
        }
    }
}

/// A specialized `Result` type for command runs.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// A specialized `Result` type for service operations.
pub type DefenderResult<T> = Result<T, DefenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_detail_prefers_stderr() {
        let err = RunnerError::non_zero_exit(Some(1), "  Start-MpScan : Access denied\r\n");
        assert_eq!(err.detail(), "Start-MpScan : Access denied");

        let bare = RunnerError::non_zero_exit(Some(5), "");
        assert_eq!(bare.detail(), "command failed with exit code 5");

        let killed = RunnerError::non_zero_exit(None, "   ");
        assert_eq!(killed.detail(), "command was terminated by a signal");
    }

    #[test]
    fn test_timeout_maps_to_timeout_variant() {
        let err: DefenderError = RunnerError::timeout(Duration::from_secs(60)).into();
        assert!(err.is_timeout());

        let err: DefenderError = RunnerError::non_zero_exit(Some(1), "boom").into();
        assert!(matches!(err, DefenderError::Invocation(_)));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::OutsideAllowList {
            path: "D:\\other".into(),
            allowed: "C:\\Data".into(),
        };
        assert!(err.to_string().contains("C:\\Data"));
        assert!(DefenderError::from(err).is_validation());
    }
}
