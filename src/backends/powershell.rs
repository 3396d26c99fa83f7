//! PowerShell command runner.
//!
//! This module runs engine scripts through Windows PowerShell, the only
//! supported way to drive the Defender cmdlets.
//!
//! # Execution
//!
//! Every script is written to a uniquely named temporary `.ps1` file and run
//! with `-File`, so script text never has to survive command-line quoting.
//! The file is removed before `run` returns, on every path. A script that
//! outlives its timeout is killed and reaped.

use crate::core::{CommandOutput, CommandRunner, RunnerError};

use async_trait::async_trait;
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Lines prepended to every script run through PowerShell.
///
/// Progress records would otherwise be serialized onto the error stream, and
/// non-terminating cmdlet errors would not set a failing exit code.
const POWERSHELL_PREAMBLE: &str =
    "$ProgressPreference = 'SilentlyContinue'\n$ErrorActionPreference = 'Stop'\n";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// PowerShell runner configuration.
#[derive(Debug, Clone)]
pub struct PowerShellConfig {
    /// Interpreter executable.
    pub executable: String,

    /// Value passed to `-ExecutionPolicy`.
    pub execution_policy: String,

    /// Replaces the standard PowerShell flags when set. The script path is
    /// always appended last.
    pub interpreter_args: Option<Vec<String>>,

    /// Text placed before every script.
    pub preamble: Option<String>,
}

impl Default for PowerShellConfig {
    fn default() -> Self {
        Self {
            executable: "powershell.exe".to_string(),
            execution_policy: "RemoteSigned".to_string(),
            interpreter_args: None,
            preamble: Some(POWERSHELL_PREAMBLE.to_string()),
        }
    }
}

impl PowerShellConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interpreter executable.
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Sets the execution policy.
    pub fn with_execution_policy(mut self, policy: impl Into<String>) -> Self {
        self.execution_policy = policy.into();
        self
    }

    /// Uses an arbitrary interpreter invoked as `<executable> <args..> <script>`.
    ///
    /// The PowerShell preamble is dropped, since it is not valid in other
    /// languages.
    pub fn with_raw_interpreter(
        mut self,
        executable: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        self.executable = executable.into();
        self.interpreter_args = Some(args);
        self.preamble = None;
        self
    }

    /// Builds the interpreter argument list for a script file.
    pub fn arguments(&self, script_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = match &self.interpreter_args {
            Some(custom) => custom.iter().map(OsString::from).collect(),
            None => [
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                self.execution_policy.as_str(),
                "-File",
            ]
            .into_iter()
            .map(OsString::from)
            .collect(),
        };
        args.push(script_path.as_os_str().to_owned());
        args
    }
}

/// Runner that executes scripts with Windows PowerShell.
///
/// # Example
///
/// ```rust,ignore
/// use defenderbridge::backends::{PowerShellConfig, PowerShellRunner};
///
/// let runner = PowerShellRunner::new(
///     PowerShellConfig::new().with_execution_policy("Bypass"),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct PowerShellRunner {
    config: PowerShellConfig,
}

impl PowerShellRunner {
    /// Creates a runner with the given configuration.
    pub fn new(config: PowerShellConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &PowerShellConfig {
        &self.config
    }

    /// Writes the script to a temporary file that is deleted on drop.
    fn write_script(&self, script: &str) -> Result<tempfile::TempPath, RunnerError> {
        let mut file = tempfile::Builder::new()
            .prefix("defenderbridge-")
            .suffix(".ps1")
            .tempfile()?;

        let preamble = self.config.preamble.as_deref().unwrap_or("");
        // Windows PowerShell reads BOM-less scripts in the legacy code page
        if !script.is_ascii() || !preamble.is_ascii() {
            file.write_all("\u{feff}".as_bytes())?;
        }
        file.write_all(preamble.as_bytes())?;
        file.write_all(script.as_bytes())?;
        file.flush()?;

        Ok(file.into_temp_path())
    }
}

/// Reads a child pipe to the end; a missing pipe yields no bytes.
async fn drain<R: AsyncRead + Unpin>(pipe: &mut Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe.as_mut() {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Returns the error text that indicates a real failure.
///
/// PowerShell serializes some informational records onto the error stream
/// as CLIXML; those are ignored unless they contain an error record.
fn meaningful_stderr(stderr: &str) -> Option<&str> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("#< CLIXML") && !trimmed.contains("S=\"Error\"") {
        return None;
    }
    Some(trimmed)
}

#[async_trait]
impl CommandRunner for PowerShellRunner {
    fn name(&self) -> &str {
        "powershell"
    }

    async fn run(&self, script: &str, timeout: Duration) -> Result<CommandOutput, RunnerError> {
        let started = Instant::now();
        let script_file = self.write_script(script)?;

        let mut command = Command::new(&self.config.executable);
        command
            .args(self.config.arguments(&script_file))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: self.config.executable.clone(),
            source,
        })?;

        tracing::trace!(
            pid = ?child.id(),
            timeout_ms = timeout.as_millis() as u64,
            "Engine script started"
        );

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let collected = tokio::time::timeout(timeout, async {
            tokio::try_join!(
                child.wait(),
                drain(&mut stdout_pipe),
                drain(&mut stderr_pipe)
            )
        })
        .await;

        let (status, stdout, stderr) = match collected {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    pid = ?child.id(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Engine script timed out, terminating"
                );
                // kill() also waits, so no zombie is left behind
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to terminate timed out script");
                }
                return Err(RunnerError::timeout(started.elapsed()));
            }
        };

        if let Err(e) = script_file.close() {
            tracing::warn!(error = %e, "Failed to remove temporary script file");
        }

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        let elapsed = started.elapsed();

        tracing::trace!(
            exit_code = ?status.code(),
            duration_ms = elapsed.as_millis() as u64,
            "Engine script finished"
        );

        if !status.success() {
            return Err(RunnerError::non_zero_exit(status.code(), stderr.trim()));
        }
        if let Some(errors) = meaningful_stderr(&stderr) {
            return Err(RunnerError::ErrorOutput {
                stderr: errors.to_string(),
            });
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code(),
            elapsed,
        })
    }
}
