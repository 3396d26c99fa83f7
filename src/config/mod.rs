//! Service configuration.
//!
//! [`DefenderConfig`] carries every tunable of the service. It can be built
//! in code with the `with_*` methods or read from `DEFENDER_*` environment
//! variables with [`DefenderConfig::from_env`].

use crate::validation::{AllowList, PathValidator};

use std::ops::RangeInclusive;
use std::time::Duration;

/// Environment variable for the concurrent scan cap.
pub const ENV_MAX_CONCURRENT_SCANS: &str = "DEFENDER_MAX_CONCURRENT_SCANS";
/// Environment variable for the custom scan start timeout.
pub const ENV_FILE_SCAN_TIMEOUT_MS: &str = "DEFENDER_FILE_SCAN_TIMEOUT_MS";
/// Environment variable for the quick scan start timeout.
pub const ENV_QUICK_SCAN_TIMEOUT_MS: &str = "DEFENDER_QUICK_SCAN_TIMEOUT_MS";
/// Environment variable for the status and threat query timeout.
pub const ENV_STATUS_TIMEOUT_MS: &str = "DEFENDER_STATUS_TIMEOUT_MS";
/// Environment variable for the signature update timeout.
pub const ENV_SIGNATURE_TIMEOUT_MS: &str = "DEFENDER_SIGNATURE_TIMEOUT_MS";
/// Environment variable for the finished job retention window.
pub const ENV_JOB_RETENTION_MS: &str = "DEFENDER_JOB_RETENTION_MS";
/// Environment variable for the eviction sweep period.
pub const ENV_SWEEP_INTERVAL_MS: &str = "DEFENDER_SWEEP_INTERVAL_MS";
/// Environment variable for the comma-separated scan roots.
pub const ENV_ALLOWED_PATHS: &str = "DEFENDER_ALLOWED_PATHS";
/// Environment variable for the PowerShell execution policy.
pub const ENV_EXECUTION_POLICY: &str = "DEFENDER_EXECUTION_POLICY";
/// Environment variable for the PowerShell executable.
pub const ENV_POWERSHELL_PATH: &str = "DEFENDER_POWERSHELL_PATH";

const CONCURRENCY_BOUNDS: RangeInclusive<u64> = 1..=16;
const TIMEOUT_BOUNDS_MS: RangeInclusive<u64> = 1_000..=3_600_000;
const RETENTION_BOUNDS_MS: RangeInclusive<u64> = 1_000..=604_800_000;
const SWEEP_BOUNDS_MS: RangeInclusive<u64> = 1_000..=86_400_000;

/// Configuration for the Defender service.
#[derive(Debug, Clone)]
pub struct DefenderConfig {
    /// Maximum number of scan start commands in flight at once.
    pub max_concurrent_scans: usize,

    /// Timeout for starting a custom (path) scan.
    pub file_scan_timeout: Duration,

    /// Timeout for starting a quick scan.
    pub quick_scan_timeout: Duration,

    /// Timeout for status, threat and job state queries.
    pub status_timeout: Duration,

    /// Timeout for a signature update.
    pub signature_timeout: Duration,

    /// How long finished jobs are kept before eviction.
    pub job_retention: Duration,

    /// How often the background sweeper evicts finished jobs.
    pub sweep_interval: Duration,

    /// Directories scan targets must live under.
    pub allowed_paths: AllowList,

    /// PowerShell execution policy passed on every invocation.
    pub execution_policy: String,

    /// PowerShell executable.
    pub powershell_path: String,
}

impl Default for DefenderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 2,
            file_scan_timeout: Duration::from_secs(60),
            quick_scan_timeout: Duration::from_secs(600),
            status_timeout: Duration::from_secs(30),
            signature_timeout: Duration::from_secs(120),
            job_retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            allowed_paths: current_dir_allow_list(),
            execution_policy: "RemoteSigned".to_string(),
            powershell_path: "powershell.exe".to_string(),
        }
    }
}

impl DefenderConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from `DEFENDER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// Missing or unparseable numbers fall back to the default; parsed
    /// numbers are clamped to their bounds.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let millis = |name: &str, default: Duration, bounds: RangeInclusive<u64>| {
            Duration::from_millis(bounded_u64(
                name,
                lookup(name).as_deref(),
                default.as_millis() as u64,
                bounds,
            ))
        };

        let max_concurrent_scans = bounded_u64(
            ENV_MAX_CONCURRENT_SCANS,
            lookup(ENV_MAX_CONCURRENT_SCANS).as_deref(),
            defaults.max_concurrent_scans as u64,
            CONCURRENCY_BOUNDS,
        ) as usize;

        let allowed_paths = match lookup(ENV_ALLOWED_PATHS) {
            Some(raw) if !raw.trim().is_empty() => {
                let parsed = AllowList::parse(&raw);
                if parsed.is_empty() {
                    tracing::warn!(
                        value = %raw,
                        "No usable entries in {ENV_ALLOWED_PATHS}, using the current directory"
                    );
                    defaults.allowed_paths.clone()
                } else {
                    parsed
                }
            }
            _ => defaults.allowed_paths.clone(),
        };

        let text = |name: &str, default: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            max_concurrent_scans,
            file_scan_timeout: millis(
                ENV_FILE_SCAN_TIMEOUT_MS,
                defaults.file_scan_timeout,
                TIMEOUT_BOUNDS_MS,
            ),
            quick_scan_timeout: millis(
                ENV_QUICK_SCAN_TIMEOUT_MS,
                defaults.quick_scan_timeout,
                TIMEOUT_BOUNDS_MS,
            ),
            status_timeout: millis(
                ENV_STATUS_TIMEOUT_MS,
                defaults.status_timeout,
                TIMEOUT_BOUNDS_MS,
            ),
            signature_timeout: millis(
                ENV_SIGNATURE_TIMEOUT_MS,
                defaults.signature_timeout,
                TIMEOUT_BOUNDS_MS,
            ),
            job_retention: millis(
                ENV_JOB_RETENTION_MS,
                defaults.job_retention,
                RETENTION_BOUNDS_MS,
            ),
            sweep_interval: millis(
                ENV_SWEEP_INTERVAL_MS,
                defaults.sweep_interval,
                SWEEP_BOUNDS_MS,
            ),
            allowed_paths,
            execution_policy: text(ENV_EXECUTION_POLICY, &defaults.execution_policy),
            powershell_path: text(ENV_POWERSHELL_PATH, &defaults.powershell_path),
        }
    }

    /// Sets the concurrent scan cap (at least 1).
    pub fn with_max_concurrent_scans(mut self, max: usize) -> Self {
        self.max_concurrent_scans = max.max(1);
        self
    }

    /// Sets the custom scan start timeout.
    pub fn with_file_scan_timeout(mut self, timeout: Duration) -> Self {
        self.file_scan_timeout = timeout;
        self
    }

    /// Sets the quick scan start timeout.
    pub fn with_quick_scan_timeout(mut self, timeout: Duration) -> Self {
        self.quick_scan_timeout = timeout;
        self
    }

    /// Sets the status query timeout.
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Sets the signature update timeout.
    pub fn with_signature_timeout(mut self, timeout: Duration) -> Self {
        self.signature_timeout = timeout;
        self
    }

    /// Sets the finished job retention window.
    pub fn with_job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = retention;
        self
    }

    /// Sets the eviction sweep period.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the scan roots.
    pub fn with_allowed_paths(mut self, allowed: AllowList) -> Self {
        self.allowed_paths = allowed;
        self
    }

    /// Sets the PowerShell execution policy.
    pub fn with_execution_policy(mut self, policy: impl Into<String>) -> Self {
        self.execution_policy = policy.into();
        self
    }

    /// Sets the PowerShell executable.
    pub fn with_powershell_path(mut self, path: impl Into<String>) -> Self {
        self.powershell_path = path.into();
        self
    }

    /// Returns the start timeout for a scan of the given kind.
    pub fn scan_timeout(&self, kind: crate::core::ScanKind) -> Duration {
        match kind {
            crate::core::ScanKind::CustomScan => self.file_scan_timeout,
            crate::core::ScanKind::QuickScan => self.quick_scan_timeout,
        }
    }

    /// Builds a path validator over the configured scan roots.
    pub fn path_validator(&self) -> PathValidator {
        PathValidator::new(self.allowed_paths.clone())
    }

    /// Builds the PowerShell runner configuration.
    #[cfg(feature = "powershell")]
    pub fn powershell(&self) -> crate::backends::PowerShellConfig {
        crate::backends::PowerShellConfig::new()
            .with_executable(self.powershell_path.clone())
            .with_execution_policy(self.execution_policy.clone())
    }
}

fn current_dir_allow_list() -> AllowList {
    match std::env::current_dir() {
        Ok(dir) => AllowList::from_entries([dir.to_string_lossy()]),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Could not read the current directory; no scan roots allowed"
            );
            AllowList::default()
        }
    }
}

fn bounded_u64(name: &str, raw: Option<&str>, default: u64, bounds: RangeInclusive<u64>) -> u64 {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return default;
    };
    match raw.parse::<u64>() {
        Ok(value) => {
            let clamped = value.clamp(*bounds.start(), *bounds.end());
            if clamped != value {
                tracing::warn!(
                    variable = name,
                    value,
                    clamped,
                    "Configuration value out of range, clamped"
                );
            }
            clamped
        }
        Err(_) => {
            tracing::warn!(
                variable = name,
                value = raw,
                default,
                "Configuration value is not a number, using default"
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DefenderConfig::from_lookup(|_| None);
        assert_eq!(config.max_concurrent_scans, 2);
        assert_eq!(config.file_scan_timeout, Duration::from_secs(60));
        assert_eq!(config.quick_scan_timeout, Duration::from_secs(600));
        assert_eq!(config.status_timeout, Duration::from_secs(30));
        assert_eq!(config.signature_timeout, Duration::from_secs(120));
        assert_eq!(config.job_retention, Duration::from_secs(3600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.execution_policy, "RemoteSigned");
        assert_eq!(config.powershell_path, "powershell.exe");
    }

    #[test]
    fn test_values_from_lookup() {
        let config = DefenderConfig::from_lookup(lookup_from(&[
            (ENV_MAX_CONCURRENT_SCANS, "4"),
            (ENV_FILE_SCAN_TIMEOUT_MS, "5000"),
            (ENV_ALLOWED_PATHS, "C:\\Scans,D:\\Inbox"),
            (ENV_EXECUTION_POLICY, " Bypass "),
            (ENV_POWERSHELL_PATH, "pwsh"),
        ]));

        assert_eq!(config.max_concurrent_scans, 4);
        assert_eq!(config.file_scan_timeout, Duration::from_millis(5000));
        assert_eq!(
            config.allowed_paths,
            AllowList::Roots(vec!["C:\\Scans".to_string(), "D:\\Inbox".to_string()])
        );
        assert_eq!(config.execution_policy, "Bypass");
        assert_eq!(config.powershell_path, "pwsh");
    }

    #[test]
    fn test_allowed_paths_from_real_directory() {
        let scans = tempfile::tempdir().unwrap();
        let sample = scans.path().join("sample.bin");
        std::fs::write(&sample, b"sample").unwrap();
        let root = scans.path().to_string_lossy().into_owned();

        let lookup = lookup_from(&[(ENV_ALLOWED_PATHS, root.as_str())]);
        let config = DefenderConfig::from_lookup(lookup);
        let validator = config.path_validator();

        assert!(validator.validate(&sample.to_string_lossy()).is_ok());
        assert!(matches!(
            validator.validate(&format!("{root}-other")),
            Err(crate::core::ValidationError::OutsideAllowList { .. })
        ));
    }

    #[test]
    fn test_numbers_are_clamped_or_defaulted() {
        let config = DefenderConfig::from_lookup(lookup_from(&[
            (ENV_MAX_CONCURRENT_SCANS, "100"),
            (ENV_FILE_SCAN_TIMEOUT_MS, "10"),
            (ENV_QUICK_SCAN_TIMEOUT_MS, "soon"),
            (ENV_JOB_RETENTION_MS, "-5"),
        ]));

        assert_eq!(config.max_concurrent_scans, 16);
        assert_eq!(config.file_scan_timeout, Duration::from_millis(1000));
        assert_eq!(config.quick_scan_timeout, Duration::from_secs(600));
        assert_eq!(config.job_retention, Duration::from_secs(3600));

        let config =
            DefenderConfig::from_lookup(lookup_from(&[(ENV_MAX_CONCURRENT_SCANS, "0")]));
        assert_eq!(config.max_concurrent_scans, 1);
    }

    #[test]
    fn test_allowed_paths() {
        let config = DefenderConfig::from_lookup(lookup_from(&[(ENV_ALLOWED_PATHS, "*")]));
        assert_eq!(config.allowed_paths, AllowList::Any);

        // Nothing usable falls back to the current directory
        let config =
            DefenderConfig::from_lookup(lookup_from(&[(ENV_ALLOWED_PATHS, "relative, also")]));
        assert_eq!(config.allowed_paths, DefenderConfig::default().allowed_paths);
    }

    #[test]
    fn test_builder() {
        let config = DefenderConfig::new()
            .with_max_concurrent_scans(0)
            .with_status_timeout(Duration::from_secs(5))
            .with_allowed_paths(AllowList::Any);

        assert_eq!(config.max_concurrent_scans, 1);
        assert_eq!(config.status_timeout, Duration::from_secs(5));
        assert_eq!(
            config.scan_timeout(crate::core::ScanKind::QuickScan),
            Duration::from_secs(600)
        );
        assert!(config.path_validator().validate("C:\\any\\file").is_ok());
    }
}
