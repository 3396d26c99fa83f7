//! Threat history readers.

use crate::core::{CommandRunner, DefenderResult};
use crate::defender::codes::{
    category_name, cleaning_action_name, detection_source_name, severity_name,
    threat_status_name, threat_type_name,
};
use crate::defender::json::{decode_records, lenient, query_json};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RawThreat {
    #[serde(rename = "ThreatID", default, deserialize_with = "lenient::string")]
    threat_id: String,
    #[serde(rename = "ThreatName", default, deserialize_with = "lenient::string")]
    threat_name: String,
    #[serde(rename = "SeverityID", default, deserialize_with = "lenient::int")]
    severity_id: i64,
    #[serde(rename = "CategoryID", default, deserialize_with = "lenient::int")]
    category_id: i64,
    #[serde(rename = "TypeID", default, deserialize_with = "lenient::int")]
    type_id: i64,
    #[serde(rename = "ThreatStatusID", default, deserialize_with = "lenient::int")]
    status_id: i64,
    #[serde(rename = "CleaningActionID", default, deserialize_with = "lenient::int")]
    cleaning_action_id: i64,
    #[serde(rename = "Resources", default, deserialize_with = "lenient::string_list")]
    resources: Vec<String>,
}

/// A threat known to the engine, with decoded code names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatRecord {
    /// Engine threat id.
    pub threat_id: String,
    /// Threat name, e.g. `Virus:DOS/EICAR_Test_File`.
    pub threat_name: String,
    /// Severity id.
    pub severity_id: i64,
    /// Severity name.
    pub severity_name: String,
    /// Category id.
    pub category_id: i64,
    /// Category name.
    pub category_name: String,
    /// Type id.
    pub type_id: i64,
    /// Type name.
    pub type_name: String,
    /// Status id.
    pub status_id: i64,
    /// Status name.
    pub status_name: String,
    /// Cleaning action id.
    pub cleaning_action_id: i64,
    /// Cleaning action name.
    pub cleaning_action_name: String,
    /// Affected resources (files, registry keys, ...).
    pub resources: Vec<String>,
}

impl From<RawThreat> for ThreatRecord {
    fn from(raw: RawThreat) -> Self {
        Self {
            severity_name: severity_name(raw.severity_id).to_string(),
            category_name: category_name(raw.category_id).to_string(),
            type_name: threat_type_name(raw.type_id).to_string(),
            status_name: threat_status_name(raw.status_id).to_string(),
            cleaning_action_name: cleaning_action_name(raw.cleaning_action_id).to_string(),
            threat_id: raw.threat_id,
            threat_name: raw.threat_name,
            severity_id: raw.severity_id,
            category_id: raw.category_id,
            type_id: raw.type_id,
            status_id: raw.status_id,
            cleaning_action_id: raw.cleaning_action_id,
            resources: raw.resources,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(rename = "ThreatID", default, deserialize_with = "lenient::string")]
    threat_id: String,
    #[serde(rename = "ThreatName", default, deserialize_with = "lenient::string")]
    threat_name: String,
    #[serde(rename = "ProcessName", default, deserialize_with = "lenient::string")]
    process_name: String,
    #[serde(rename = "DetectionSourceTypeID", default, deserialize_with = "lenient::int")]
    detection_source_id: i64,
    #[serde(rename = "ThreatStatusID", default, deserialize_with = "lenient::int")]
    status_id: i64,
    #[serde(rename = "InitialDetectionTime", default, deserialize_with = "lenient::timestamp")]
    initial_detection_time: Option<DateTime<Utc>>,
    #[serde(
        rename = "LastThreatStatusChangeTime",
        default,
        deserialize_with = "lenient::timestamp"
    )]
    last_status_change_time: Option<DateTime<Utc>>,
    #[serde(rename = "RemediationTime", default, deserialize_with = "lenient::timestamp")]
    remediation_time: Option<DateTime<Utc>>,
    #[serde(rename = "Resources", default, deserialize_with = "lenient::string_list")]
    resources: Vec<String>,
    #[serde(rename = "AdditionalActionsBitMask", default, deserialize_with = "lenient::int")]
    additional_actions_bitmask: i64,
}

/// One detection event from the engine's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatDetection {
    /// Engine threat id.
    pub threat_id: String,
    /// Threat name, when the engine includes it.
    pub threat_name: String,
    /// Process that touched the resource.
    pub process_name: String,
    /// Detection source id.
    pub detection_source_id: i64,
    /// Detection source name.
    pub detection_source_name: String,
    /// Status id.
    pub status_id: i64,
    /// Status name.
    pub status_name: String,
    /// When the threat was first detected.
    pub initial_detection_time: Option<DateTime<Utc>>,
    /// When the threat status last changed.
    pub last_status_change_time: Option<DateTime<Utc>>,
    /// When the threat was remediated.
    pub remediation_time: Option<DateTime<Utc>>,
    /// Affected resources.
    pub resources: Vec<String>,
    /// Follow-up actions the engine still needs (reboot, full scan, ...).
    pub additional_actions_bitmask: i64,
}

impl From<RawDetection> for ThreatDetection {
    fn from(raw: RawDetection) -> Self {
        Self {
            detection_source_name: detection_source_name(raw.detection_source_id).to_string(),
            status_name: threat_status_name(raw.status_id).to_string(),
            threat_id: raw.threat_id,
            threat_name: raw.threat_name,
            process_name: raw.process_name,
            detection_source_id: raw.detection_source_id,
            status_id: raw.status_id,
            initial_detection_time: raw.initial_detection_time,
            last_status_change_time: raw.last_status_change_time,
            remediation_time: raw.remediation_time,
            resources: raw.resources,
            additional_actions_bitmask: raw.additional_actions_bitmask,
        }
    }
}

/// Lists threats known to the engine. No output means no threats.
pub async fn read_threats(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> DefenderResult<Vec<ThreatRecord>> {
    let value = query_json(runner, "Get-MpThreat", "Get-MpThreat", timeout).await?;
    let raw: Vec<RawThreat> = decode_records("Get-MpThreat", value)?;
    Ok(raw.into_iter().map(ThreatRecord::from).collect())
}

/// Lists the engine's detection history, newest first.
pub async fn read_threat_detections(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> DefenderResult<Vec<ThreatDetection>> {
    let value = query_json(
        runner,
        "Get-MpThreatDetection",
        "Get-MpThreatDetection",
        timeout,
    )
    .await?;
    let raw: Vec<RawDetection> = decode_records("Get-MpThreatDetection", value)?;
    let mut detections: Vec<ThreatDetection> = raw.into_iter().map(ThreatDetection::from).collect();
    detections.sort_by(|a, b| b.initial_detection_time.cmp(&a.initial_detection_time));
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockResponse, MockRunner};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_read_single_threat_object() {
        let runner = MockRunner::always(MockResponse::output(
            r#"{"ThreatID":2147519003,"ThreatName":"Virus:DOS/EICAR_Test_File","SeverityID":5,
               "CategoryID":42,"TypeID":0,"ThreatStatusID":3,"CleaningActionID":2,
               "Resources":"file:_C:\\Users\\test\\eicar.com"}"#,
        ));

        let threats = read_threats(&runner, TIMEOUT).await.unwrap();
        assert_eq!(threats.len(), 1);

        let threat = &threats[0];
        assert_eq!(threat.threat_id, "2147519003");
        assert_eq!(threat.severity_name, "Unknown");
        assert_eq!(threat.category_name, "VIRUS");
        assert_eq!(threat.type_name, "Known Bad");
        assert_eq!(threat.status_name, "Quarantined");
        assert_eq!(threat.cleaning_action_name, "Quarantine");
        assert_eq!(threat.resources, vec!["file:_C:\\Users\\test\\eicar.com"]);
    }

    #[tokio::test]
    async fn test_read_threat_array_and_empty() {
        let runner = MockRunner::always(MockResponse::output(
            r#"[{"ThreatID":"1","SeverityID":"4","Resources":null},{"ThreatID":2,"SeverityID":1}]"#,
        ));
        let threats = read_threats(&runner, TIMEOUT).await.unwrap();
        assert_eq!(threats.len(), 2);
        assert_eq!(threats[0].severity_name, "Severe");
        assert!(threats[0].resources.is_empty());
        assert_eq!(threats[1].severity_name, "Low");

        let runner = MockRunner::always(MockResponse::output("   \r\n"));
        assert!(read_threats(&runner, TIMEOUT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_threats_propagates_failure() {
        let runner = MockRunner::always(MockResponse::exit(1, "Access denied"));
        assert!(read_threats(&runner, TIMEOUT).await.is_err());
    }

    #[tokio::test]
    async fn test_read_detections_sorted_newest_first() {
        let runner = MockRunner::always(MockResponse::output(
            r#"[{"ThreatID":1,"DetectionSourceTypeID":3,"ThreatStatusID":1,
                 "InitialDetectionTime":"2024-01-01T00:00:00Z","ProcessName":"explorer.exe",
                 "Resources":["file:_C:\\a.exe","file:_C:\\b.exe"]},
                {"ThreatID":2,"DetectionSourceTypeID":7,
                 "InitialDetectionTime":"\/Date(1717200000000)\/","RemediationTime":null,
                 "AdditionalActionsBitMask":4}]"#,
        ));

        let detections = read_threat_detections(&runner, TIMEOUT).await.unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].threat_id, "2");
        assert_eq!(detections[0].detection_source_name, "ELAM");
        assert_eq!(detections[0].additional_actions_bitmask, 4);
        assert!(detections[0].remediation_time.is_none());
        assert_eq!(detections[1].detection_source_name, "Realtime");
        assert_eq!(detections[1].status_name, "Detected");
        assert_eq!(detections[1].resources.len(), 2);
    }
}
