//! The service facade.

use crate::audit;
use crate::config::DefenderConfig;
use crate::core::{ArcRunner, CommandRunner, DefenderResult, JobId, QueueStats, ScanJob, ScanKind};
use crate::defender::{self, ComputerStatus, SignatureUpdate, ThreatDetection, ThreatRecord};
use crate::manager::{self, ScanOrchestrator, SweeperHandle};

use std::sync::Arc;

/// Builder for creating a `DefenderService`.
pub struct DefenderServiceBuilder {
    runner: Option<ArcRunner>,
    config: DefenderConfig,
}

impl DefenderServiceBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            runner: None,
            config: DefenderConfig::default(),
        }
    }

    /// Sets the command runner.
    pub fn with_runner<R: CommandRunner + 'static>(mut self, runner: R) -> Self {
        self.runner = Some(Arc::new(runner));
        self
    }

    /// Sets a command runner wrapped in an Arc.
    pub fn with_arc_runner(mut self, runner: ArcRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: DefenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the service.
    ///
    /// Without an explicit runner, a PowerShell runner is built from the
    /// configuration when the `powershell` feature is enabled.
    pub fn build(self) -> DefenderResult<DefenderService> {
        let runner = match self.runner {
            Some(runner) => runner,
            None => default_runner(&self.config)?,
        };

        if self.config.allowed_paths.is_empty() {
            tracing::warn!("No allowed scan roots configured, every custom scan will be rejected");
        }

        tracing::info!(
            runner = runner.name(),
            max_concurrent_scans = self.config.max_concurrent_scans,
            allowed_paths = %self.config.allowed_paths.describe(),
            "Defender service ready"
        );

        Ok(DefenderService {
            orchestrator: ScanOrchestrator::new(Arc::clone(&runner), &self.config),
            runner,
            config: self.config,
        })
    }
}

impl Default for DefenderServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "powershell")]
fn default_runner(config: &DefenderConfig) -> DefenderResult<ArcRunner> {
    Ok(Arc::new(crate::backends::PowerShellRunner::new(
        config.powershell(),
    )))
}

#[cfg(not(feature = "powershell"))]
fn default_runner(_config: &DefenderConfig) -> DefenderResult<ArcRunner> {
    Err(crate::core::DefenderError::configuration(
        "A command runner is required when the powershell feature is disabled",
    ))
}

/// Scans, status and threat queries against one engine.
///
/// Owns the job registry through its orchestrator; there is no global
/// state, so independent services never see each other's jobs.
///
/// # Examples
///
/// ```rust,no_run
/// use defenderbridge::prelude::*;
///
/// # async fn example() -> Result<(), DefenderError> {
/// let service = DefenderService::builder()
///     .with_config(DefenderConfig::from_env())
///     .build()?;
/// let _sweeper = service.spawn_sweeper();
///
/// let job = service.scan_path("C:\\Users\\Public\\Downloads")?;
/// let latest = service.poll_scan(&job.job_id).await;
/// println!("{:?}", latest.map(|job| job.state));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DefenderService {
    orchestrator: ScanOrchestrator,
    runner: ArcRunner,
    config: DefenderConfig,
}

impl DefenderService {
    /// Creates a new builder.
    pub fn builder() -> DefenderServiceBuilder {
        DefenderServiceBuilder::new()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DefenderConfig {
        &self.config
    }

    /// Returns the orchestrator.
    pub fn orchestrator(&self) -> &ScanOrchestrator {
        &self.orchestrator
    }

    /// Submits a scan and returns the queued job without waiting.
    pub fn submit_scan(&self, target: Option<&str>, kind: ScanKind) -> DefenderResult<ScanJob> {
        self.orchestrator.submit(target, kind)
    }

    /// Submits a custom scan of `path`.
    pub fn scan_path(&self, path: &str) -> DefenderResult<ScanJob> {
        self.submit_scan(Some(path), ScanKind::CustomScan)
    }

    /// Submits a quick scan.
    pub fn quick_scan(&self) -> DefenderResult<ScanJob> {
        self.submit_scan(None, ScanKind::QuickScan)
    }

    /// Returns the best known state of a job, or `None` if it is unknown.
    pub async fn poll_scan(&self, job_id: &JobId) -> Option<ScanJob> {
        self.orchestrator.poll(job_id).await
    }

    /// Returns every tracked job, newest first.
    pub fn list_jobs(&self) -> Vec<ScanJob> {
        self.orchestrator.list_jobs()
    }

    /// Returns the queue snapshot.
    pub fn queue_stats(&self) -> QueueStats {
        self.orchestrator.stats()
    }

    /// Reads the engine's protection status.
    pub async fn computer_status(&self) -> DefenderResult<ComputerStatus> {
        defender::read_computer_status(self.runner.as_ref(), self.config.status_timeout).await
    }

    /// Lists threats known to the engine.
    pub async fn threats(&self) -> DefenderResult<Vec<ThreatRecord>> {
        defender::read_threats(self.runner.as_ref(), self.config.status_timeout).await
    }

    /// Lists the engine's detection history.
    pub async fn threat_detections(&self) -> DefenderResult<Vec<ThreatDetection>> {
        defender::read_threat_detections(self.runner.as_ref(), self.config.status_timeout).await
    }

    /// Updates signatures, reporting the version before and after.
    pub async fn update_signatures(&self) -> DefenderResult<SignatureUpdate> {
        let update = defender::update_signatures(
            self.runner.as_ref(),
            self.config.status_timeout,
            self.config.signature_timeout,
        )
        .await?;
        audit::emit_signature_update(&update);
        Ok(update)
    }

    /// Evicts finished jobs older than the retention window now.
    pub fn sweep_finished_jobs(&self) -> Vec<JobId> {
        manager::sweep(self.orchestrator.registry(), self.config.job_retention)
    }

    /// Starts periodic eviction of finished jobs.
    ///
    /// The sweep stops when the returned handle is dropped.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        manager::spawn_sweeper(
            Arc::clone(self.orchestrator.registry()),
            self.config.job_retention,
            self.config.sweep_interval,
        )
    }
}
