use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::warn;

use super::transcript_logger::TranscriptLogger;
use super::utils::atomic_write;
use super::workflow_logger::WorkflowLogger;
use crate::errors::ScanError;
use crate::models::Finding;
use crate::pipeline::exploitation::ExploitationOutcome;

/// Raw logs for one scan under `<output>/<scan_id>/audit/`.
pub struct AuditSession {
    base_dir: PathBuf,
    workflow_logger: Mutex<WorkflowLogger>,
}

impl AuditSession {
    pub async fn initialize(scan_dir: &Path, scan_id: &str, target: &str) -> Result<Self, ScanError> {
        let base_dir = scan_dir.join("audit");
        tokio::fs::create_dir_all(base_dir.join("transcripts")).await?;

        let workflow_logger = WorkflowLogger::new(&base_dir);
        workflow_logger.initialize(scan_id, target).await?;

        Ok(Self {
            base_dir,
            workflow_logger: Mutex::new(workflow_logger),
        })
    }

    /// Audit logging never fails the scan.
    pub async fn milestone(&self, message: &str) {
        if let Err(e) = self.workflow_logger.lock().await.log_event(message).await {
            warn!(error = %e, "Failed to write workflow log");
        }
    }

    pub async fn record_transcript(&self, sequence: usize, outcome: &ExploitationOutcome) {
        let result = async {
            let mut logger = TranscriptLogger::new(&self.base_dir, sequence, &outcome.candidate.name).await?;
            logger.write_outcome(outcome).await
        }
        .await;
        if let Err(e) = result {
            warn!(parameter = %outcome.candidate.name, error = %e, "Failed to write transcript");
        }
    }

    /// Every classified finding, false positives included.
    pub async fn record_raw_findings(&self, findings: &[Finding]) -> Result<(), ScanError> {
        let json = serde_json::to_string_pretty(findings)?;
        atomic_write(&self.base_dir.join("raw_findings.json"), &json).await
    }
}
