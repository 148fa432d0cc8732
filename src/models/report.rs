use chrono::{DateTime, Utc};
use serde::Serialize;

use super::finding::{Finding, FindingStatus, Severity};
use crate::fingerprint::TechnologyProfile;
use crate::llm::UsageSummary;
use crate::pipeline::state::PipelineStage;
use crate::probe::ProbeStats;

/// Everything the report writer needs about one finished (or aborted) scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub profile: TechnologyProfile,
    pub stage: PipelineStage,
    pub parameters_tested: usize,
    /// All classified findings, false positives included.
    pub findings: Vec<Finding>,
    pub usage: UsageSummary,
    pub requests: ProbeStats,
    /// Sections that could not be fully evaluated, and why.
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FindingCounts {
    pub exploited: usize,
    pub potential: usize,
    pub false_positives: usize,
}

impl FindingCounts {
    /// Reported vulnerability count. False positives are excluded.
    pub fn vulnerabilities(&self) -> usize {
        self.exploited + self.potential
    }
}

impl ScanReport {
    /// Findings that belong in the report, most severe first.
    pub fn reportable(&self) -> Vec<&Finding> {
        let mut findings: Vec<&Finding> = self.findings.iter().filter(|f| f.is_reportable()).collect();
        findings.sort_by_key(|f| f.severity.rank());
        findings
    }

    pub fn counts(&self) -> FindingCounts {
        let mut counts = FindingCounts::default();
        for finding in &self.findings {
            match finding.status {
                FindingStatus::Exploited => counts.exploited += 1,
                FindingStatus::PotentialBlocked => counts.potential += 1,
                FindingStatus::FalsePositive => counts.false_positives += 1,
            }
        }
        counts
    }

    /// Highest severity among reportable findings.
    pub fn risk_level(&self) -> Option<Severity> {
        self.reportable().first().map(|f| f.severity)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }
}
