//! Mock command runner for testing.
//!
//! This module provides a configurable runner that answers engine scripts
//! from a rule table, so the queue and orchestrator can be exercised without
//! PowerShell or Defender installed.

use crate::core::{CommandOutput, CommandRunner, RunnerError};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// A canned answer to a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Succeed with the given standard output.
    Output(String),
    /// Exit with a failure code and error text.
    Exit {
        /// Exit code to report.
        code: i32,
        /// Error stream text.
        stderr: String,
    },
    /// Exit cleanly but write to the error stream.
    ErrorOutput(String),
    /// Run until the caller's timeout elapses, then report a timeout.
    Timeout,
    /// Fail to start the interpreter.
    SpawnFailure(String),
}

impl MockResponse {
    /// Shorthand for [`MockResponse::Output`].
    pub fn output(stdout: impl Into<String>) -> Self {
        Self::Output(stdout.into())
    }

    /// Shorthand for [`MockResponse::Exit`].
    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Self::Exit {
            code,
            stderr: stderr.into(),
        }
    }
}

/// A mock runner for testing purposes.
///
/// Rules are matched in insertion order by substring of the script; the
/// first match wins and unmatched scripts get the default response.
///
/// # Examples
///
/// ```rust
/// use defenderbridge::backends::{MockResponse, MockRunner};
/// use std::time::Duration;
///
/// // Every scan start returns engine job 7, state queries say "Completed"
/// let runner = MockRunner::new()
///     .with_rule("Start-MpScan", MockResponse::output("7"))
///     .with_rule("Get-Job", MockResponse::output("Completed"))
///     .with_latency(Duration::from_millis(20));
///
/// // A runner whose every command times out
/// let runner = MockRunner::always(MockResponse::Timeout);
/// ```
#[derive(Debug)]
pub struct MockRunner {
    /// Name of this runner instance.
    name: String,
    /// Rules as (script substring, response).
    rules: RwLock<Vec<(String, MockResponse)>>,
    /// Response for scripts no rule matches.
    default_response: MockResponse,
    /// Simulated execution time.
    latency: Option<Duration>,
    /// Every script received, in call order.
    calls: Mutex<Vec<String>>,
    /// Runs currently executing.
    in_flight: AtomicUsize,
    /// Highest observed value of `in_flight`.
    max_in_flight: AtomicUsize,
}

impl MockRunner {
    /// Creates a runner that answers every script with empty output.
    pub fn new() -> Self {
        Self::always(MockResponse::Output(String::new()))
    }

    /// Creates a runner that answers every script with `response`.
    pub fn always(response: MockResponse) -> Self {
        Self {
            name: "mock".to_string(),
            rules: RwLock::new(Vec::new()),
            default_response: response,
            latency: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sets the name of this runner.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a rule for scripts containing `needle`.
    pub fn with_rule(self, needle: impl Into<String>, response: MockResponse) -> Self {
        self.add_rule(needle, response);
        self
    }

    /// Sets the simulated execution time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds a rule after construction. Earlier rules keep priority.
    pub fn add_rule(&self, needle: impl Into<String>, response: MockResponse) {
        self.rules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((needle.into(), response));
    }

    /// Removes every rule.
    pub fn clear_rules(&self) {
        self.rules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Returns every script received so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the number of scripts received so far.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns the highest number of runs that executed at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn response_for(&self, script: &str) -> MockResponse {
        self.rules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone())
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter even if the run future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, script: &str, timeout: Duration) -> Result<CommandOutput, RunnerError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(script.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let response = self.response_for(script);

        if response == MockResponse::Timeout {
            tokio::time::sleep(timeout).await;
            return Err(RunnerError::timeout(timeout));
        }

        if let Some(latency) = self.latency {
            if latency >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(RunnerError::timeout(timeout));
            }
            tokio::time::sleep(latency).await;
        }

        let elapsed = self.latency.unwrap_or(Duration::ZERO);
        match response {
            MockResponse::Output(stdout) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
                exit_code: Some(0),
                elapsed,
            }),
            MockResponse::Exit { code, stderr } => {
                Err(RunnerError::non_zero_exit(Some(code), stderr))
            }
            MockResponse::ErrorOutput(stderr) => Err(RunnerError::ErrorOutput { stderr }),
            MockResponse::SpawnFailure(reason) => Err(RunnerError::Spawn {
                program: self.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, reason),
            }),
            MockResponse::Timeout => Err(RunnerError::timeout(timeout)),
        }
    }
}
