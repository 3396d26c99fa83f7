//! Named tools over the service, ready for any request/response transport.
//!
//! Each tool takes a JSON object of arguments and returns text plus an
//! error flag. Nothing here knows about the transport that carries them.

use crate::core::{JobId, QueueStats, ScanJob};
use crate::service::DefenderService;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Description of one tool for discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    /// Tool name used in calls.
    pub name: &'static str,
    /// Human-readable summary.
    pub description: &'static str,
    /// JSON Schema of the arguments object.
    pub input_schema: Value,
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResponse {
    /// Response body, usually pretty-printed JSON.
    pub text: String,
    /// The call failed.
    pub is_error: bool,
}

impl ToolResponse {
    /// A successful response.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    /// A failed response.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// A successful response carrying `value` as pretty JSON.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(text) => Self::ok(text),
            Err(e) => Self::error(format!("Could not encode response: {e}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScanFileArgs {
    #[serde(alias = "path")]
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct ScanStatusArgs {
    #[serde(alias = "jobId")]
    job_id: String,
}

#[derive(Serialize)]
struct JobView<'a> {
    #[serde(flatten)]
    job: &'a ScanJob,
    duration_ms: i64,
    queue_stats: QueueStats,
}

/// The tool surface of a [`DefenderService`].
#[derive(Debug, Clone)]
pub struct DefenderTools {
    service: Arc<DefenderService>,
}

impl DefenderTools {
    /// Wraps a service.
    pub fn new(service: Arc<DefenderService>) -> Self {
        Self { service }
    }

    /// Returns the wrapped service.
    pub fn service(&self) -> &Arc<DefenderService> {
        &self.service
    }

    /// Lists the available tools.
    pub fn descriptors() -> Vec<ToolDescriptor> {
        let no_args = json!({ "type": "object", "properties": {} });
        vec![
            ToolDescriptor {
                name: "scan_file",
                description: "Queue a custom scan of a file or directory; returns a job id to poll",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "Absolute path of the file or directory to scan"
                        }
                    },
                    "required": ["file_path"]
                }),
            },
            ToolDescriptor {
                name: "quick_scan",
                description: "Queue a quick system scan; returns a job id to poll",
                input_schema: no_args.clone(),
            },
            ToolDescriptor {
                name: "get_scan_status",
                description: "Check the status of a scan job",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "job_id": {
                            "type": "string",
                            "description": "The job id returned by scan_file or quick_scan"
                        }
                    },
                    "required": ["job_id"]
                }),
            },
            ToolDescriptor {
                name: "get_queue_stats",
                description: "Show running and queued scans",
                input_schema: no_args.clone(),
            },
            ToolDescriptor {
                name: "get_defender_status",
                description: "Get protection status, signature versions and feature states",
                input_schema: no_args.clone(),
            },
            ToolDescriptor {
                name: "get_threats",
                description: "List detected threats with severity, category and remediation status",
                input_schema: no_args.clone(),
            },
            ToolDescriptor {
                name: "get_threat_detections",
                description: "Get threat detection history with timestamps and sources",
                input_schema: no_args.clone(),
            },
            ToolDescriptor {
                name: "update_signatures",
                description: "Trigger a signature definition update",
                input_schema: no_args,
            },
        ]
    }

    /// Calls the tool `name` with `args`.
    ///
    /// Never fails; errors come back as a response with `is_error` set.
    pub async fn call(&self, name: &str, args: &Value) -> ToolResponse {
        tracing::debug!(tool = name, "Tool call");
        match name {
            "scan_file" => self.scan_file(args),
            "quick_scan" => self.quick_scan(),
            "get_scan_status" => self.scan_status(args).await,
            "get_queue_stats" => ToolResponse::json(&self.service.queue_stats()),
            "get_defender_status" => match self.service.computer_status().await {
                Ok(status) => ToolResponse::json(&status),
                Err(e) => ToolResponse::error(format!("Error getting status: {e}")),
            },
            "get_threats" => match self.service.threats().await {
                Ok(threats) if threats.is_empty() => {
                    ToolResponse::ok("No active threats detected.")
                }
                Ok(threats) => ToolResponse::json(&threats),
                Err(e) => ToolResponse::error(format!("Error getting threats: {e}")),
            },
            "get_threat_detections" => match self.service.threat_detections().await {
                Ok(detections) if detections.is_empty() => {
                    ToolResponse::ok("No threat detections found.")
                }
                Ok(detections) => ToolResponse::json(&detections),
                Err(e) => ToolResponse::error(format!("Error getting detections: {e}")),
            },
            "update_signatures" => match self.service.update_signatures().await {
                Ok(update) => ToolResponse::json(&update),
                Err(e) => ToolResponse::error(format!("Error updating signatures: {e}")),
            },
            other => ToolResponse::error(format!("Unknown tool: {other}")),
        }
    }

    fn scan_file(&self, args: &Value) -> ToolResponse {
        let args: ScanFileArgs = match parse_args("scan_file", args) {
            Ok(args) => args,
            Err(response) => return response,
        };
        match self.service.scan_path(&args.file_path) {
            Ok(job) => self.queued(&job),
            Err(e) => ToolResponse::error(format!("Cannot scan {}: {e}", args.file_path)),
        }
    }

    fn quick_scan(&self) -> ToolResponse {
        match self.service.quick_scan() {
            Ok(job) => self.queued(&job),
            Err(e) => ToolResponse::error(format!("Cannot start quick scan: {e}")),
        }
    }

    async fn scan_status(&self, args: &Value) -> ToolResponse {
        let args: ScanStatusArgs = match parse_args("get_scan_status", args) {
            Ok(args) => args,
            Err(response) => return response,
        };
        let Ok(job_id) = args.job_id.parse::<JobId>() else {
            return ToolResponse::error(format!("Invalid job id: {}", args.job_id));
        };

        match self.service.poll_scan(&job_id).await {
            Some(job) => ToolResponse::json(&JobView {
                duration_ms: job.elapsed().num_milliseconds(),
                queue_stats: self.service.queue_stats(),
                job: &job,
            }),
            None => ToolResponse::error(format!("No scan job found with ID: {job_id}")),
        }
    }

    fn queued(&self, job: &ScanJob) -> ToolResponse {
        ToolResponse::json(&json!({
            "job_id": job.job_id,
            "state": job.state,
            "kind": job.kind,
            "target_path": job.target_path,
            "queue_stats": self.service.queue_stats(),
            "message": "Scan queued. Use get_scan_status with this job_id to follow it.",
        }))
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: &Value) -> Result<T, ToolResponse> {
    // Transports send `null` for tools called without arguments
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args)
        .map_err(|e| ToolResponse::error(format!("Invalid arguments for {tool}: {e}")))
}
