//! Scan job example demonstrating queued scans and polling.
//!
//! This example shows how to:
//! - Configure a service with a concurrency cap and allowed scan roots
//! - Submit more scans than the cap allows and watch the queue drain
//! - Poll jobs until the engine reports them finished
//!
//! A mock runner stands in for PowerShell so the example runs anywhere.
//!
//! Run with: cargo run --example scan_jobs

use defenderbridge::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,defenderbridge::audit=debug".into()),
        )
        .init();

    println!("=== Defenderbridge Scan Job Example ===\n");

    // Every scan start takes 200ms and hands back engine job 17; the engine
    // then reports that job as completed.
    let runner = MockRunner::new()
        .with_rule("Start-MpScan", MockResponse::output("17"))
        .with_rule("Get-Job", MockResponse::output("Completed"))
        .with_latency(Duration::from_millis(200));

    let config = DefenderConfig::new()
        .with_max_concurrent_scans(2)
        .with_allowed_paths(AllowList::parse("C:\\Users\\Public,D:\\Shares"));

    let service = DefenderService::builder()
        .with_runner(runner)
        .with_config(config)
        .build()?;
    let _sweeper = service.spawn_sweeper();

    let targets = [
        "C:\\Users\\Public\\Downloads",
        "c:/users/public/Documents/report.docx",
        "D:\\Shares\\inbox",
    ];

    let mut jobs = Vec::new();
    for target in targets {
        let job = service.scan_path(target)?;
        println!("Queued {} -> {:?}", job.job_id, job.target_path);
        jobs.push(job.job_id);
    }
    jobs.push(service.quick_scan()?.job_id);

    let stats = service.queue_stats();
    println!(
        "\nQueue: {} running, {} queued, {} tracked",
        stats.running, stats.queued, stats.total_tracked
    );

    // Rejected before anything runs
    for bad in ["\\\\fileserver\\share", "C:\\Users\\Public\\..\\Admin", "C:\\Windows"] {
        match service.scan_path(bad) {
            Ok(job) => println!("Unexpectedly queued {}", job.job_id),
            Err(e) => println!("Rejected {bad}: {e}"),
        }
    }

    println!("\n=== Polling ===");
    loop {
        let mut pending = 0;
        for id in &jobs {
            if let Some(job) = service.poll_scan(id).await {
                if !job.is_finished() {
                    pending += 1;
                }
            }
        }
        if pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for job in service.list_jobs() {
        println!(
            "{} {:<11} {:<8} {:?} took {}ms",
            job.job_id,
            job.kind.to_string(),
            job.state.to_string(),
            job.confirmation,
            job.elapsed().num_milliseconds()
        );
    }

    Ok(())
}
