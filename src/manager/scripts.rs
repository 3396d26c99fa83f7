//! Engine scripts for the scan lifecycle.

use crate::core::{ExternalHandle, ScanKind, ValidationError};
use crate::validation::quote_literal;

/// Builds the script that starts a background scan and prints its job id.
///
/// A custom scan needs a target; the path must already be validated. A
/// quick scan ignores any target.
pub fn start_scan(kind: ScanKind, target: Option<&str>) -> Result<String, ValidationError> {
    match kind {
        ScanKind::CustomScan => {
            let target = target.ok_or(ValidationError::Empty)?;
            Ok(format!(
                "$job = Start-MpScan -ScanType CustomScan -ScanPath {} -AsJob; $job.Id",
                quote_literal(target)
            ))
        }
        ScanKind::QuickScan => {
            Ok("$job = Start-MpScan -ScanType QuickScan -AsJob; $job.Id".to_string())
        }
    }
}

/// Builds the script that prints the state of an engine background job.
pub fn job_state(handle: ExternalHandle) -> String {
    format!("(Get-Job -Id {handle}).State")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_scan_script() {
        let script = start_scan(ScanKind::CustomScan, Some("C:\\Users\\test\\file.exe")).unwrap();
        assert_eq!(
            script,
            "$job = Start-MpScan -ScanType CustomScan -ScanPath 'C:\\Users\\test\\file.exe' -AsJob; $job.Id"
        );
    }

    #[test]
    fn test_custom_scan_script_quotes_path() {
        let script = start_scan(ScanKind::CustomScan, Some("C:\\it's; calc")).unwrap();
        assert!(script.contains("-ScanPath 'C:\\it''s; calc' -AsJob"));
    }

    #[test]
    fn test_custom_scan_needs_target() {
        assert_eq!(
            start_scan(ScanKind::CustomScan, None),
            Err(ValidationError::Empty)
        );
    }

    #[test]
    fn test_quick_scan_ignores_target() {
        let script = start_scan(ScanKind::QuickScan, Some("C:\\ignored")).unwrap();
        assert_eq!(script, "$job = Start-MpScan -ScanType QuickScan -AsJob; $job.Id");
    }

    #[test]
    fn test_job_state_script() {
        assert_eq!(job_state(ExternalHandle::new(42)), "(Get-Job -Id 42).State");
    }
}
