//! Scan job lifecycle.

use crate::audit;
use crate::config::DefenderConfig;
use crate::core::{
    ArcRunner, Confirmation, DefenderError, DefenderResult, ExternalHandle, JobId, JobState,
    QueueStats, ScanJob, ScanKind, ValidationError,
};
use crate::manager::queue::ScanQueue;
use crate::manager::registry::JobRegistry;
use crate::manager::scripts;
use crate::validation::{sanitize_text, PathValidator, MAX_DETAIL_CHARS};

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// State of an engine background job as printed by `Get-Job`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalJobState {
    /// Still in progress (`NotStarted`, `Running`, `Blocked`, ...).
    Active(String),
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Stopped before finishing.
    Stopped,
    /// Anything else, including empty output.
    Unknown(String),
}

impl ExternalJobState {
    /// Parses the last non-empty line of a state query, ignoring case.
    pub fn parse(output: &str) -> Self {
        let raw = output
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or_default();

        match raw.to_ascii_lowercase().as_str() {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            "notstarted" | "running" | "blocked" | "suspended" | "suspending" | "stopping"
            | "atbreakpoint" | "disconnected" => Self::Active(raw.to_string()),
            _ => Self::Unknown(raw.to_string()),
        }
    }
}

/// Drives scan jobs from submission to a terminal state.
///
/// Submission validates the target, records a `Queued` job and hands the
/// start command to the [`ScanQueue`]; it never waits for the scan. The
/// engine runs the scan in its own background job, so a started scan stays
/// `Running` with its external handle until [`poll`](Self::poll) observes
/// the engine job finishing.
#[derive(Debug)]
pub struct ScanOrchestrator {
    runner: ArcRunner,
    queue: ScanQueue,
    validator: PathValidator,
    file_scan_timeout: Duration,
    quick_scan_timeout: Duration,
    status_timeout: Duration,
}

impl ScanOrchestrator {
    /// Creates an orchestrator with a fresh registry and queue.
    pub fn new(runner: ArcRunner, config: &DefenderConfig) -> Self {
        Self::with_registry(runner, config, Arc::new(JobRegistry::new()))
    }

    /// Creates an orchestrator over an existing registry.
    pub fn with_registry(
        runner: ArcRunner,
        config: &DefenderConfig,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            runner,
            queue: ScanQueue::with_registry(config.max_concurrent_scans, registry),
            validator: config.path_validator(),
            file_scan_timeout: config.file_scan_timeout,
            quick_scan_timeout: config.quick_scan_timeout,
            status_timeout: config.status_timeout,
        }
    }

    /// Returns the job registry.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        self.queue.registry()
    }

    /// Returns the scan queue.
    pub fn queue(&self) -> &ScanQueue {
        &self.queue
    }

    /// Returns the queue snapshot.
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Returns the stored record without contacting the engine.
    pub fn get(&self, job_id: &JobId) -> Option<ScanJob> {
        self.registry().get(job_id)
    }

    /// Returns every tracked job, most recently submitted first.
    pub fn list_jobs(&self) -> Vec<ScanJob> {
        let mut jobs = self.registry().list_all();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        jobs
    }

    /// Accepts a scan request and returns the queued job immediately.
    ///
    /// A custom scan needs a target, which is validated and normalized
    /// before anything is recorded. A quick scan ignores the target.
    ///
    /// # Errors
    ///
    /// Returns [`DefenderError::Validation`] for a missing or unsafe target.
    /// No job is created in that case.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn submit(&self, target: Option<&str>, kind: ScanKind) -> DefenderResult<ScanJob> {
        let target_path = match kind {
            ScanKind::CustomScan => {
                let raw = target.ok_or(ValidationError::Empty)?;
                Some(self.validator.validate(raw)?.into_string())
            }
            ScanKind::QuickScan => {
                if target.is_some() {
                    tracing::debug!("Ignoring target path for quick scan");
                }
                None
            }
        };

        let script = scripts::start_scan(kind, target_path.as_deref())?;
        let timeout = match kind {
            ScanKind::CustomScan => self.file_scan_timeout,
            ScanKind::QuickScan => self.quick_scan_timeout,
        };

        let job = ScanJob::new(kind, target_path);
        self.registry().put(job.clone());
        audit::emit_job_submitted(&job);

        self.queue.submit(
            job.job_id,
            run_scan_job(
                Arc::clone(&self.runner),
                Arc::clone(self.registry()),
                job.job_id,
                script,
                timeout,
            ),
        );

        Ok(job)
    }

    /// Returns the best known state of a job, or `None` for an unknown id.
    ///
    /// A `Running` job with an engine handle costs one state query; a
    /// failed query is logged and the stored record is returned unchanged.
    /// Polling a finished job is a pure read.
    pub async fn poll(&self, job_id: &JobId) -> Option<ScanJob> {
        match self.reconcile(job_id).await {
            Ok(job) => job,
            Err(err) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %err,
                    "Could not reconcile scan job, returning last known state"
                );
                self.registry().get(job_id)
            }
        }
    }

    /// Like [`poll`](Self::poll), but reports a failed state query.
    ///
    /// # Errors
    ///
    /// Returns [`DefenderError::Reconciliation`] if the engine could not be
    /// asked about the job or gave an unrecognized answer. The stored record
    /// is left as it was.
    pub async fn reconcile(&self, job_id: &JobId) -> DefenderResult<Option<ScanJob>> {
        let Some(job) = self.registry().get(job_id) else {
            return Ok(None);
        };
        let handle = match (job.state, job.external_handle) {
            (JobState::Running, Some(handle)) => handle,
            _ => return Ok(Some(job)),
        };

        let output = self
            .runner
            .run(&scripts::job_state(handle), self.status_timeout)
            .await
            .map_err(|err| DefenderError::Reconciliation {
                handle,
                reason: sanitize_text(&err.detail(), MAX_DETAIL_CHARS),
            })?;

        let registry = self.registry();
        let updated = match ExternalJobState::parse(&output.stdout) {
            ExternalJobState::Completed => apply(registry, job_id, |job| {
                job.complete(Confirmation::ExternallyConfirmed)
            }),
            ExternalJobState::Failed => apply(registry, job_id, |job| {
                job.fail(format!("engine job {handle} reported Failed"))
            }),
            ExternalJobState::Stopped => apply(registry, job_id, |job| {
                job.fail(format!("engine job {handle} was stopped before finishing"))
            }),
            ExternalJobState::Active(state) => {
                tracing::debug!(
                    job_id = %job_id,
                    external_handle = %handle,
                    external_state = %state,
                    "Engine job still in progress"
                );
                None
            }
            ExternalJobState::Unknown(raw) => {
                let reason = if raw.is_empty() {
                    "engine returned no job state".to_string()
                } else {
                    format!("unrecognized engine job state '{}'", sanitize_text(&raw, 100))
                };
                return Err(DefenderError::Reconciliation { handle, reason });
            }
        };

        Ok(updated.or_else(|| registry.get(job_id)).or(Some(job)))
    }
}

/// Applies a lifecycle step to a stored job and audits any state change.
///
/// Returns the updated record if `step` reported a change.
fn apply<F>(registry: &JobRegistry, job_id: &JobId, step: F) -> Option<ScanJob>
where
    F: FnOnce(&mut ScanJob) -> bool,
{
    let mut from = None;
    let mut changed = false;
    let job = registry.update(job_id, |job| {
        from = Some(job.state);
        changed = step(job);
    })?;

    if !changed {
        return None;
    }
    if let Some(from) = from.filter(|from| *from != job.state) {
        audit::emit_job_transition(&job, from);
    }
    Some(job)
}

/// The task the queue runs for one job: start the engine scan and record
/// how that went.
async fn run_scan_job(
    runner: ArcRunner,
    registry: Arc<JobRegistry>,
    job_id: JobId,
    script: String,
    timeout: Duration,
) {
    let Some(job) = apply(&registry, &job_id, ScanJob::mark_running) else {
        tracing::warn!(job_id = %job_id, "Scan job is no longer queued, skipping");
        return;
    };

    tracing::info!(
        job_id = %job_id,
        kind = %job.kind,
        runner = runner.name(),
        timeout_ms = timeout.as_millis() as u64,
        "Starting engine scan"
    );

    let Ok(result) = AssertUnwindSafe(runner.run(&script, timeout))
        .catch_unwind()
        .await
    else {
        tracing::error!(job_id = %job_id, runner = runner.name(), "Command runner panicked");
        apply(&registry, &job_id, |job| job.fail("command runner panicked"));
        return;
    };

    match result {
        Ok(output) => match ExternalHandle::parse_output(&output.stdout) {
            Some(handle) => {
                if let Some(job) = apply(&registry, &job_id, |job| job.record_handle(handle)) {
                    audit::emit_job_accepted(&job);
                }
                tracing::info!(
                    job_id = %job_id,
                    external_handle = %handle,
                    "Engine accepted scan, completion is confirmed by polling"
                );
            }
            None => {
                tracing::warn!(
                    job_id = %job_id,
                    output = %sanitize_text(output.trimmed(), 200),
                    "Engine accepted scan without a job id, its outcome cannot be tracked"
                );
                apply(&registry, &job_id, |job| {
                    job.complete(Confirmation::InvocationAccepted)
                });
            }
        },
        Err(err) if err.is_timeout() => {
            tracing::warn!(job_id = %job_id, error = %err, "Scan start command timed out");
            apply(&registry, &job_id, |job| {
                job.time_out(format!("scan start command timed out after {timeout:?}"))
            });
        }
        Err(err) => {
            tracing::warn!(job_id = %job_id, error = %err, "Scan start command failed");
            let detail = sanitize_text(&err.detail(), MAX_DETAIL_CHARS);
            apply(&registry, &job_id, |job| job.fail(detail));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockResponse, MockRunner};
    use crate::validation::AllowList;
    use tokio::time::sleep;

    fn config(cap: usize) -> DefenderConfig {
        DefenderConfig::new()
            .with_max_concurrent_scans(cap)
            .with_allowed_paths(AllowList::Any)
            .with_file_scan_timeout(Duration::from_secs(2))
    }

    fn orchestrator(runner: &Arc<MockRunner>, cap: usize) -> ScanOrchestrator {
        let runner: ArcRunner = runner.clone();
        ScanOrchestrator::new(runner, &config(cap))
    }

    async fn wait_for_state(orch: &ScanOrchestrator, id: &JobId, done: fn(&ScanJob) -> bool) {
        for _ in 0..10_000 {
            if orch.get(id).as_ref().is_some_and(done) {
                return;
            }
            sleep(Duration::from_millis(1)).await;
        }
        panic!("job {id} never reached the expected state: {:?}", orch.get(id));
    }

    fn accepted(job: &ScanJob) -> bool {
        job.external_handle.is_some() || job.is_finished()
    }

    #[tokio::test]
    async fn test_submit_returns_queued_job_immediately() {
        let runner = Arc::new(
            MockRunner::new()
                .with_rule("Start-MpScan", MockResponse::output("7"))
                .with_latency(Duration::from_millis(50)),
        );
        let orch = orchestrator(&runner, 1);

        let job = orch.submit(Some("C:\\Users\\test\\file.exe"), ScanKind::CustomScan).unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert!(job.finished_at.is_none());
        assert_eq!(job.target_path.as_deref(), Some("C:\\Users\\test\\file.exe"));
        assert_eq!(orch.stats().total_tracked, 1);
    }

    #[tokio::test]
    async fn test_two_phase_completion() {
        let runner = Arc::new(
            MockRunner::new()
                .with_rule("Start-MpScan", MockResponse::output("7"))
                .with_rule("Get-Job", MockResponse::output("Running")),
        );
        let orch = orchestrator(&runner, 2);

        let job = orch.submit(Some("C:\\Data"), ScanKind::CustomScan).unwrap();
        wait_for_state(&orch, &job.job_id, accepted).await;

        let running = orch.poll(&job.job_id).await.unwrap();
        assert_eq!(running.state, JobState::Running);
        assert_eq!(running.external_handle, Some(ExternalHandle::new(7)));
        assert!(running.accepted_at.is_some());
        assert!(running.finished_at.is_none());
        assert!(runner.calls().iter().any(|c| c == "(Get-Job -Id 7).State"));

        runner.clear_rules();
        runner.add_rule("Get-Job", MockResponse::output("Completed"));

        let done = orch.poll(&job.job_id).await.unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.confirmation, Some(Confirmation::ExternallyConfirmed));
        assert!(done.finished_at.is_some());

        // Finished jobs are not queried again
        let calls = runner.call_count();
        let again = orch.poll(&job.job_id).await.unwrap();
        assert_eq!(again, done);
        assert_eq!(runner.call_count(), calls);
    }

    #[tokio::test]
    async fn test_missing_handle_completes_as_invocation_accepted() {
        let runner = Arc::new(MockRunner::always(MockResponse::output("WARNING: something")));
        let orch = orchestrator(&runner, 1);

        let job = orch.submit(None, ScanKind::QuickScan).unwrap();
        wait_for_state(&orch, &job.job_id, ScanJob::is_finished).await;

        let job = orch.poll(&job.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.confirmation, Some(Confirmation::InvocationAccepted));
        assert!(job.external_handle.is_none());
        assert!(job.finished_at.is_some());
        assert!(job.target_path.is_none());
    }

    #[tokio::test]
    async fn test_command_failure_records_detail() {
        let runner = Arc::new(MockRunner::always(MockResponse::exit(
            1,
            "Start-MpScan : Access denied\r\n",
        )));
        let orch = orchestrator(&runner, 1);

        let job = orch.submit(Some("C:\\Data"), ScanKind::CustomScan).unwrap();
        wait_for_state(&orch, &job.job_id, ScanJob::is_finished).await;

        let job = orch.get(&job.job_id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failure_detail.as_deref(), Some("Start-MpScan : Access denied"));
        assert!(job.finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_timing_out_runner() {
        let runner = Arc::new(MockRunner::always(MockResponse::Timeout));
        let orch = orchestrator(&runner, 1);

        let job = orch.submit(Some("C:\\Data\\big.iso"), ScanKind::CustomScan).unwrap();
        wait_for_state(&orch, &job.job_id, ScanJob::is_finished).await;
        sleep(Duration::from_millis(10)).await;

        let job = orch.poll(&job.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Timeout);
        assert!(!job.failure_detail.unwrap_or_default().is_empty());
        assert_eq!(orch.stats().running, 0);
    }

    #[derive(Debug)]
    struct PanickingRunner;

    #[async_trait::async_trait]
    impl crate::core::CommandRunner for PanickingRunner {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn run(
            &self,
            _script: &str,
            _timeout: Duration,
        ) -> crate::core::RunnerResult<crate::core::CommandOutput> {
            panic!("runner bug")
        }
    }

    #[tokio::test]
    async fn test_panicking_runner_fails_job() {
        let orch = ScanOrchestrator::new(Arc::new(PanickingRunner), &config(1));

        let job = orch.submit(None, ScanKind::QuickScan).unwrap();
        wait_for_state(&orch, &job.job_id, ScanJob::is_finished).await;

        let failed = orch.get(&job.job_id).unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert!(failed.finished_at.is_some());
        assert_eq!(
            failed.failure_detail.as_deref(),
            Some("command runner panicked")
        );
        assert_eq!(orch.stats().running, 0);

        // Terminal, so eviction can reclaim it
        let later = chrono::Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(
            orch.registry().evict_finished_before(later),
            vec![job.job_id]
        );
        assert!(orch.registry().is_empty());
    }

    #[tokio::test]
    async fn test_poll_unknown_job() {
        let runner = Arc::new(MockRunner::new());
        let orch = orchestrator(&runner, 1);
        orch.registry().put(ScanJob::quick());

        assert!(orch.poll(&JobId::new()).await.is_none());
        assert_eq!(orch.registry().len(), 1);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_target_creates_no_job() {
        let runner = Arc::new(MockRunner::new());
        let orch = ScanOrchestrator::new(
            runner.clone(),
            &config(1).with_allowed_paths(AllowList::parse("C:\\Scans")),
        );

        for target in [
            None,
            Some(""),
            Some("relative"),
            Some("C:\\Scans\\..\\Windows"),
            Some("C:\\Other"),
        ] {
            let err = orch.submit(target, ScanKind::CustomScan).unwrap_err();
            assert!(err.is_validation(), "{target:?} gave {err}");
        }

        tokio::task::yield_now().await;
        assert!(orch.registry().is_empty());
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reconciliation_failure_keeps_state() {
        let runner = Arc::new(
            MockRunner::new()
                .with_rule("Start-MpScan", MockResponse::output("9"))
                .with_rule(
                    "Get-Job",
                    MockResponse::exit(
                        1,
                        "Get-Job : The command cannot find a job with the job ID 9.",
                    ),
                ),
        );
        let orch = orchestrator(&runner, 1);

        let job = orch.submit(None, ScanKind::QuickScan).unwrap();
        wait_for_state(&orch, &job.job_id, accepted).await;

        let err = orch.reconcile(&job.job_id).await.unwrap_err();
        assert!(matches!(err, DefenderError::Reconciliation { .. }));

        let job = orch.poll(&job.job_id).await.unwrap();
        assert_eq!(job.state, JobState::Running);
        assert!(job.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_unrecognized_engine_state() {
        let runner = Arc::new(
            MockRunner::new()
                .with_rule("Start-MpScan", MockResponse::output("3"))
                .with_rule("Get-Job", MockResponse::output("")),
        );
        let orch = orchestrator(&runner, 1);

        let job = orch.submit(None, ScanKind::QuickScan).unwrap();
        wait_for_state(&orch, &job.job_id, accepted).await;

        assert!(orch.reconcile(&job.job_id).await.is_err());
        assert_eq!(orch.get(&job.job_id).unwrap().state, JobState::Running);
    }

    #[tokio::test]
    async fn test_external_failure_and_stop() {
        for (answer, needle) in [("Failed", "reported Failed"), ("Stopped", "stopped")] {
            let runner = Arc::new(
                MockRunner::new()
                    .with_rule("Start-MpScan", MockResponse::output("5"))
                    .with_rule("Get-Job", MockResponse::output(answer)),
            );
            let orch = orchestrator(&runner, 1);

            let job = orch.submit(Some("D:\\share"), ScanKind::CustomScan).unwrap();
            wait_for_state(&orch, &job.job_id, accepted).await;

            let job = orch.poll(&job.job_id).await.unwrap();
            assert_eq!(job.state, JobState::Failed);
            assert!(job.failure_detail.unwrap().contains(needle));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_respects_cap() {
        let runner = Arc::new(
            MockRunner::new()
                .with_rule("Start-MpScan", MockResponse::output("1"))
                .with_latency(Duration::from_millis(100)),
        );
        let orch = orchestrator(&runner, 2);

        let ids: Vec<JobId> = (0..6)
            .map(|i| {
                orch.submit(Some(&format!("C:\\Data\\{i}.bin")), ScanKind::CustomScan)
                    .unwrap()
                    .job_id
            })
            .collect();

        let stats = orch.stats();
        assert_eq!((stats.running, stats.queued, stats.total_tracked), (2, 4, 6));

        for id in &ids {
            wait_for_state(&orch, id, accepted).await;
        }

        assert_eq!(runner.max_in_flight(), 2);
        assert_eq!(runner.call_count(), 6);
        assert!(orch
            .list_jobs()
            .iter()
            .all(|job| job.state == JobState::Running && job.external_handle.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_states_only_move_forward() {
        let runner = Arc::new(
            MockRunner::new()
                .with_rule("Start-MpScan", MockResponse::output("11"))
                .with_rule("Get-Job", MockResponse::output("Running"))
                .with_latency(Duration::from_millis(20)),
        );
        let orch = orchestrator(&runner, 1);

        // A blocker keeps the job queued for a while
        orch.submit(None, ScanKind::QuickScan).unwrap();
        let job = orch.submit(Some("C:\\Data"), ScanKind::CustomScan).unwrap();

        let mut seen = vec![job.state];
        for step in 0..200 {
            if step == 100 {
                runner.clear_rules();
                runner.add_rule("Get-Job", MockResponse::output("Completed"));
            }
            let job = orch.poll(&job.job_id).await.unwrap();
            assert_eq!(job.finished_at.is_some(), job.state.is_terminal());
            seen.push(job.state);
            sleep(Duration::from_millis(5)).await;
        }

        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(seen.first(), Some(&JobState::Queued));
        assert_eq!(seen.last(), Some(&JobState::Completed));
        assert!(seen.contains(&JobState::Running));
    }

    #[test]
    fn test_external_state_parsing() {
        assert_eq!(ExternalJobState::parse("Completed\r\n"), ExternalJobState::Completed);
        assert_eq!(ExternalJobState::parse("failed"), ExternalJobState::Failed);
        assert_eq!(ExternalJobState::parse("Stopped"), ExternalJobState::Stopped);
        assert_eq!(
            ExternalJobState::parse("NotStarted"),
            ExternalJobState::Active("NotStarted".into())
        );
        assert_eq!(ExternalJobState::parse(""), ExternalJobState::Unknown(String::new()));
        assert_eq!(
            ExternalJobState::parse("Exploded"),
            ExternalJobState::Unknown("Exploded".into())
        );
    }
}
