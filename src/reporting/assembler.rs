use std::path::{Path, PathBuf};

use tracing::info;

use crate::audit::utils::atomic_write;
use crate::errors::ScanError;
use crate::models::{Finding, ScanReport};

use super::formatter::format_report;

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub markdown: PathBuf,
    pub findings: PathBuf,
}

/// Write `report.md` and `findings.json` (reportable findings only) into
/// the scan directory.
pub async fn write_report(scan_dir: &Path, report: &ScanReport) -> Result<ReportPaths, ScanError> {
    tokio::fs::create_dir_all(scan_dir).await?;

    let reportable: Vec<&Finding> = report.reportable();
    let findings = scan_dir.join("findings.json");
    atomic_write(&findings, &serde_json::to_string_pretty(&reportable)?).await?;
    info!(path = %findings.display(), count = reportable.len(), "Wrote findings.json");

    let markdown = scan_dir.join("report.md");
    atomic_write(&markdown, &format_report(report)).await?;
    info!(path = %markdown.display(), "Report written");

    Ok(ReportPaths { markdown, findings })
}
