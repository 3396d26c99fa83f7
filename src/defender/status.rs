//! Protection status of the engine.

use crate::core::{CommandRunner, DefenderResult};
use crate::defender::codes::computer_state_name;
use crate::defender::json::{decode_one, lenient, query_json};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STATUS_COMMAND: &str = "Get-MpComputerStatus | Select-Object AMServiceEnabled, \
AMRunningMode, AntivirusEnabled, AntispywareEnabled, BehaviorMonitorEnabled, \
IoavProtectionEnabled, NISEnabled, OnAccessProtectionEnabled, RealTimeProtectionEnabled, \
AntivirusSignatureVersion, AntivirusSignatureLastUpdated, QuickScanAge, FullScanAge, \
QuickScanEndTime, FullScanEndTime, TamperProtectionSource, ComputerState";

/// Age the engine reports for a scan that never ran.
const NEVER_SCANNED: i64 = u32::MAX as i64;

#[derive(Debug, Deserialize)]
struct RawComputerStatus {
    #[serde(rename = "AMServiceEnabled", default, deserialize_with = "lenient::bool")]
    service_enabled: bool,
    #[serde(rename = "AMRunningMode", default, deserialize_with = "lenient::string")]
    running_mode: String,
    #[serde(rename = "AntivirusEnabled", default, deserialize_with = "lenient::bool")]
    antivirus_enabled: bool,
    #[serde(rename = "AntispywareEnabled", default, deserialize_with = "lenient::bool")]
    antispyware_enabled: bool,
    #[serde(rename = "BehaviorMonitorEnabled", default, deserialize_with = "lenient::bool")]
    behavior_monitor_enabled: bool,
    #[serde(rename = "IoavProtectionEnabled", default, deserialize_with = "lenient::bool")]
    ioav_protection_enabled: bool,
    #[serde(rename = "NISEnabled", default, deserialize_with = "lenient::bool")]
    nis_enabled: bool,
    #[serde(rename = "OnAccessProtectionEnabled", default, deserialize_with = "lenient::bool")]
    on_access_protection_enabled: bool,
    #[serde(rename = "RealTimeProtectionEnabled", default, deserialize_with = "lenient::bool")]
    real_time_protection_enabled: bool,
    #[serde(rename = "AntivirusSignatureVersion", default, deserialize_with = "lenient::string")]
    signature_version: String,
    #[serde(
        rename = "AntivirusSignatureLastUpdated",
        default,
        deserialize_with = "lenient::timestamp"
    )]
    signature_last_updated: Option<DateTime<Utc>>,
    #[serde(rename = "QuickScanAge", default, deserialize_with = "lenient::opt_int")]
    quick_scan_age: Option<i64>,
    #[serde(rename = "FullScanAge", default, deserialize_with = "lenient::opt_int")]
    full_scan_age: Option<i64>,
    #[serde(rename = "QuickScanEndTime", default, deserialize_with = "lenient::timestamp")]
    quick_scan_end: Option<DateTime<Utc>>,
    #[serde(rename = "FullScanEndTime", default, deserialize_with = "lenient::timestamp")]
    full_scan_end: Option<DateTime<Utc>>,
    #[serde(rename = "TamperProtectionSource", default, deserialize_with = "lenient::string")]
    tamper_protection_source: String,
    #[serde(rename = "ComputerState", default, deserialize_with = "lenient::opt_int")]
    computer_state: Option<i64>,
}

/// Protection status as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputerStatus {
    /// Antivirus protection is on.
    pub antivirus_enabled: bool,
    /// Antispyware protection is on.
    pub antispyware_enabled: bool,
    /// Behaviour monitoring is on.
    pub behavior_monitor_enabled: bool,
    /// Scanning of downloads and attachments is on.
    pub ioav_protection_enabled: bool,
    /// Network inspection is on.
    pub nis_enabled: bool,
    /// On-access protection is on.
    pub on_access_protection_enabled: bool,
    /// Real-time protection is on.
    pub real_time_protection_enabled: bool,
    /// The engine service is running.
    pub service_running: bool,
    /// Antivirus signature version.
    pub signature_version: String,
    /// When signatures were last updated.
    pub signature_last_updated: Option<DateTime<Utc>>,
    /// Days since the last quick scan; `None` if there never was one.
    pub quick_scan_age_days: Option<i64>,
    /// Days since the last full scan; `None` if there never was one.
    pub full_scan_age_days: Option<i64>,
    /// When the last quick scan ended.
    pub last_quick_scan: Option<DateTime<Utc>>,
    /// When the last full scan ended.
    pub last_full_scan: Option<DateTime<Utc>>,
    /// What manages tamper protection.
    pub tamper_protection_source: String,
    /// Engine running mode, e.g. `Normal` or `Passive`.
    pub running_mode: String,
    /// Decoded computer state.
    pub computer_state: String,
}

impl From<RawComputerStatus> for ComputerStatus {
    fn from(raw: RawComputerStatus) -> Self {
        let age = |days: Option<i64>| days.filter(|d| (0..NEVER_SCANNED).contains(d));
        let or_unknown = |text: String| {
            if text.trim().is_empty() {
                "Unknown".to_string()
            } else {
                text
            }
        };

        Self {
            antivirus_enabled: raw.antivirus_enabled,
            antispyware_enabled: raw.antispyware_enabled,
            behavior_monitor_enabled: raw.behavior_monitor_enabled,
            ioav_protection_enabled: raw.ioav_protection_enabled,
            nis_enabled: raw.nis_enabled,
            on_access_protection_enabled: raw.on_access_protection_enabled,
            real_time_protection_enabled: raw.real_time_protection_enabled,
            service_running: raw.service_enabled,
            signature_version: raw.signature_version,
            signature_last_updated: raw.signature_last_updated,
            quick_scan_age_days: age(raw.quick_scan_age),
            full_scan_age_days: age(raw.full_scan_age),
            last_quick_scan: raw.quick_scan_end,
            last_full_scan: raw.full_scan_end,
            tamper_protection_source: or_unknown(raw.tamper_protection_source),
            running_mode: or_unknown(raw.running_mode),
            computer_state: raw
                .computer_state
                .map_or_else(|| "Unknown".to_string(), computer_state_name),
        }
    }
}

/// Reads the engine's protection status.
pub async fn read_computer_status(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> DefenderResult<ComputerStatus> {
    let value = query_json(runner, "Get-MpComputerStatus", STATUS_COMMAND, timeout).await?;
    let raw: RawComputerStatus = decode_one("Get-MpComputerStatus", value)?;
    Ok(raw.into())
}

/// Reads only the antivirus signature version.
pub async fn read_signature_version(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> DefenderResult<String> {
    let output = runner
        .run("(Get-MpComputerStatus).AntivirusSignatureVersion", timeout)
        .await?;
    Ok(output.trimmed().to_string())
}
