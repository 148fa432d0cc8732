use serde::{Deserialize, Serialize};

use crate::pipeline::state::{ParameterLocation, PipelineStage, TerminalState};
use crate::probe::ProbeMethod;

/// Severity level for a security finding, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Returns a numeric rank where lower values indicate higher severity.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Info => "Info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    /// Impact demonstrated through the public interface.
    Exploited,
    /// Injectable but not proven, either blocked or inconclusive.
    #[serde(rename = "POTENTIAL")]
    PotentialBlocked,
    /// Not actually vulnerable. Kept in raw logs only.
    FalsePositive,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Exploited => "EXPLOITED",
            FindingStatus::PotentialBlocked => "POTENTIAL",
            FindingStatus::FalsePositive => "FALSE_POSITIVE",
        }
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified result for one tested parameter. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub title: String,
    pub target: String,
    pub endpoint: String,
    pub parameter: String,
    pub location: ParameterLocation,
    pub method: ProbeMethod,
    pub stage_reached: PipelineStage,
    pub terminal_state: TerminalState,
    pub status: FindingStatus,
    pub severity: Severity,
    pub description: String,
    /// Excerpt of the last transcript turns.
    pub evidence: String,
    /// Payload of the last exchange that got a response. Empty when none did.
    pub proof_of_concept: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<String>,
    pub remediation: String,
    pub cwe: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Finding {
    /// False positives never count as vulnerabilities.
    pub fn is_reportable(&self) -> bool {
        self.status != FindingStatus::FalsePositive
    }
}
