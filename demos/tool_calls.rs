//! Tool call example demonstrating the JSON tool surface.
//!
//! This example shows how to:
//! - List the available tools and their argument schemas
//! - Call tools with JSON arguments and read text responses
//! - Handle error responses
//!
//! Run with: cargo run --example tool_calls

use defenderbridge::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const STATUS: &str = r#"{"AMServiceEnabled":true,"AntivirusEnabled":true,
    "RealTimeProtectionEnabled":true,"IsTamperProtected":true,
    "AntivirusSignatureVersion":"1.409.112.0","QuickScanAge":1,"FullScanAge":4294967295,
    "ComputerState":0}"#;

const THREATS: &str = r#"[{"ThreatID":2147519003,"ThreatName":"Virus:DOS/EICAR_Test_File",
    "SeverityID":5,"CategoryID":42,"TypeID":0,"ThreatStatusID":3,"CleaningActionID":2,
    "Resources":["file:_C:\\Users\\Public\\Downloads\\eicar.com"]}]"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    println!("=== Defenderbridge Tool Call Example ===\n");

    let runner = MockRunner::new()
        .with_rule("Start-MpScan", MockResponse::output("3"))
        .with_rule("Get-Job", MockResponse::output("Running"))
        .with_rule("Get-MpThreatDetection", MockResponse::output(""))
        .with_rule("Get-MpThreat", MockResponse::output(THREATS))
        .with_rule("Select-Object", MockResponse::output(STATUS))
        .with_rule("AntivirusSignatureVersion", MockResponse::output("1.409.112.0"));

    let service = DefenderService::builder()
        .with_runner(runner)
        .with_config(
            DefenderConfig::new().with_allowed_paths(AllowList::parse("C:\\Users\\Public")),
        )
        .build()?;
    let tools = DefenderTools::new(Arc::new(service));

    for tool in DefenderTools::descriptors() {
        println!("{:<22} {}", tool.name, tool.description);
    }

    let queued = tools
        .call(
            "scan_file",
            &json!({ "file_path": "C:\\Users\\Public\\Downloads\\eicar.com" }),
        )
        .await;
    println!("\n> scan_file\n{}", queued.text);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let body: serde_json::Value = serde_json::from_str(&queued.text)?;
    let status = tools
        .call("get_scan_status", &json!({ "job_id": body["job_id"] }))
        .await;
    println!("\n> get_scan_status\n{}", status.text);

    for name in [
        "get_queue_stats",
        "get_defender_status",
        "get_threats",
        "get_threat_detections",
        "update_signatures",
    ] {
        let response = tools.call(name, &serde_json::Value::Null).await;
        println!("\n> {name}\n{}", response.text);
    }

    let rejected = tools
        .call("scan_file", &json!({ "file_path": "\\\\server\\share\\x.exe" }))
        .await;
    println!("\n> scan_file (UNC)\nerror={} {}", rejected.is_error, rejected.text);

    Ok(())
}
