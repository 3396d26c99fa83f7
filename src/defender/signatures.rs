//! Signature updates.

use crate::core::{CommandRunner, DefenderResult};
use crate::defender::status::read_signature_version;
use crate::validation::{sanitize_text, MAX_DETAIL_CHARS};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a signature update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureUpdate {
    /// The update command succeeded.
    pub success: bool,
    /// Signature version before the update.
    pub previous_version: String,
    /// Signature version afterwards; equals the previous one on failure.
    pub current_version: String,
    /// Why the update failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SignatureUpdate {
    /// Returns `true` if the version changed.
    pub fn changed(&self) -> bool {
        self.success && self.previous_version != self.current_version
    }
}

/// Runs `Update-MpSignature`, reading the version before and after.
///
/// # Errors
///
/// A failed update is reported in the returned value. Failing to read the
/// signature version is an error.
pub async fn update_signatures(
    runner: &dyn CommandRunner,
    status_timeout: Duration,
    update_timeout: Duration,
) -> DefenderResult<SignatureUpdate> {
    let previous_version = read_signature_version(runner, status_timeout).await?;

    if let Err(err) = runner.run("Update-MpSignature", update_timeout).await {
        tracing::warn!(error = %err, "Signature update failed");
        return Ok(SignatureUpdate {
            success: false,
            current_version: previous_version.clone(),
            previous_version,
            error: Some(sanitize_text(&err.detail(), MAX_DETAIL_CHARS)),
        });
    }

    let current_version = read_signature_version(runner, status_timeout).await?;
    Ok(SignatureUpdate {
        success: true,
        previous_version,
        current_version,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockResponse, MockRunner};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_successful_update() {
        let runner = MockRunner::new()
            .with_rule("AntivirusSignatureVersion", MockResponse::output("1.1.1.0"))
            .with_rule("Update-MpSignature", MockResponse::output(""));

        let update = update_signatures(&runner, TIMEOUT, TIMEOUT).await.unwrap();
        assert!(update.success);
        assert!(!update.changed());
        assert_eq!(update.current_version, "1.1.1.0");
        assert_eq!(runner.call_count(), 3);
        assert_eq!(runner.calls()[1], "Update-MpSignature");
    }

    #[tokio::test]
    async fn test_failed_update_is_reported_in_value() {
        let runner = MockRunner::new()
            .with_rule("AntivirusSignatureVersion", MockResponse::output("1.1.1.0"))
            .with_rule(
                "Update-MpSignature",
                MockResponse::exit(
                    1,
                    "Update-MpSignature : Virus and spyware definitions update was completed with errors.",
                ),
            );

        let update = update_signatures(&runner, TIMEOUT, TIMEOUT).await.unwrap();
        assert!(!update.success);
        assert_eq!(update.previous_version, update.current_version);
        assert!(update.error.unwrap().contains("completed with errors"));
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_version_read_failure_propagates() {
        let runner = MockRunner::always(MockResponse::exit(1, "service stopped"));
        assert!(update_signatures(&runner, TIMEOUT, TIMEOUT).await.is_err());
    }
}
