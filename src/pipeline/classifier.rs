//! Maps a finished exploitation transcript to a reportable finding.

use super::exploitation::ExploitationOutcome;
use super::state::{CandidateParameter, PipelineStage, TerminalState};
use super::transcript::ExploitationTranscript;
use crate::models::{Finding, FindingStatus, Severity};

pub const SQL_INJECTION_CWE: &str = "CWE-89";
pub const SQL_INJECTION_REMEDIATION: &str = "Use parameterized queries; implement input validation; \
apply least privilege principle for database access";

const EVIDENCE_TURNS: usize = 3;
const EVIDENCE_BODY_CHARS: usize = 600;
pub const INCONCLUSIVE_NOTE: &str =
    "Investigation was inconclusive: the exploitation loop ended without a verdict.";

/// Every terminal state maps to exactly one status and severity.
pub fn status_for(state: TerminalState) -> (FindingStatus, Severity) {
    match state {
        TerminalState::Exploited => (FindingStatus::Exploited, Severity::High),
        TerminalState::PotentialBlocked | TerminalState::Exhausted => {
            (FindingStatus::PotentialBlocked, Severity::Medium)
        }
        TerminalState::FalsePositive => (FindingStatus::FalsePositive, Severity::Info),
    }
}

/// Pure mapping from transcript and terminal state to a finding. `sequence`
/// numbers the finding within the scan.
pub fn classify(
    target: &str,
    candidate: &CandidateParameter,
    transcript: &ExploitationTranscript,
    state: TerminalState,
    sequence: usize,
) -> Finding {
    let (status, severity) = status_for(state);
    let proof_of_concept = transcript
        .last_successful_exchange()
        .map(|(payload, _)| payload.to_string())
        .unwrap_or_default();

    let mut notes: Vec<String> = transcript.notes().to_vec();
    if state == TerminalState::Exhausted {
        notes.push(INCONCLUSIVE_NOTE.to_string());
    }

    let title = match status {
        FindingStatus::Exploited => format!("SQL injection in parameter '{}'", candidate.name),
        FindingStatus::PotentialBlocked => format!("Potential SQL injection in parameter '{}'", candidate.name),
        FindingStatus::FalsePositive => format!("No SQL injection in parameter '{}'", candidate.name),
    };
    let description = match state {
        TerminalState::Exploited => format!(
            "The {} parameter '{}' on {} {} is injectable; attacker-controlled SQL was executed.",
            candidate.location, candidate.name, candidate.method, candidate.endpoint
        ),
        TerminalState::PotentialBlocked => format!(
            "The {} parameter '{}' on {} {} shows injection behaviour, but extraction was blocked.",
            candidate.location, candidate.name, candidate.method, candidate.endpoint
        ),
        TerminalState::Exhausted => format!(
            "The {} parameter '{}' on {} {} was flagged during detection; exploitation did not reach a verdict.",
            candidate.location, candidate.name, candidate.method, candidate.endpoint
        ),
        TerminalState::FalsePositive => format!(
            "The anomaly on {} parameter '{}' has an innocent explanation.",
            candidate.location, candidate.name
        ),
    };

    Finding {
        id: format!("SQLI-{:03}", sequence),
        title,
        target: target.to_string(),
        endpoint: candidate.endpoint.clone(),
        parameter: candidate.name.clone(),
        location: candidate.location,
        method: candidate.method,
        stage_reached: PipelineStage::Exploiting,
        terminal_state: state,
        status,
        severity,
        description,
        evidence: transcript.excerpt(EVIDENCE_TURNS, EVIDENCE_BODY_CHARS),
        proof_of_concept,
        extracted: None,
        remediation: SQL_INJECTION_REMEDIATION.to_string(),
        cwe: SQL_INJECTION_CWE.to_string(),
        notes,
    }
}

/// Classify an exploitation outcome, carrying over the backend's summary
/// and any extracted data.
pub fn classify_outcome(target: &str, outcome: &ExploitationOutcome, sequence: usize) -> Finding {
    let mut finding = classify(target, &outcome.candidate, &outcome.transcript, outcome.terminal, sequence);
    if let Some(summary) = &outcome.summary {
        finding.description = format!("{} {}", finding.description, summary);
    }
    finding.extracted = outcome.extracted.clone();
    finding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::transcript::{ProbeOutcome, TranscriptTurn};
    use crate::probe::ProbeResult;
    use chrono::Utc;

    fn candidate() -> CandidateParameter {
        CandidateParameter::guessed("http://t.test/items", "id")
    }

    fn transcript(payloads: &[&str]) -> ExploitationTranscript {
        let mut t = ExploitationTranscript::new("id");
        for (i, p) in payloads.iter().enumerate() {
            t.push(TranscriptTurn {
                iteration: i as u32 + 1,
                backend: "capable:stub/m".into(),
                reply: String::new(),
                payload: Some(p.to_string()),
                outcome: ProbeOutcome::Response { result: ProbeResult::captured("GET", 200, &[], "ok") },
                verdict: None,
                timestamp: Utc::now(),
            });
        }
        t
    }

    #[test]
    fn test_every_state_maps_to_one_pair() {
        assert_eq!(status_for(TerminalState::Exploited), (FindingStatus::Exploited, Severity::High));
        assert_eq!(
            status_for(TerminalState::PotentialBlocked),
            (FindingStatus::PotentialBlocked, Severity::Medium)
        );
        assert_eq!(status_for(TerminalState::Exhausted), (FindingStatus::PotentialBlocked, Severity::Medium));
        assert_eq!(status_for(TerminalState::FalsePositive), (FindingStatus::FalsePositive, Severity::Info));
    }

    #[test]
    fn test_exploited_uses_last_payload() {
        let f = classify("http://t.test", &candidate(), &transcript(&["1'", "1 OR 1=1"]), TerminalState::Exploited, 1);
        assert_eq!(f.id, "SQLI-001");
        assert_eq!(f.proof_of_concept, "1 OR 1=1");
        assert_eq!(f.cwe, "CWE-89");
        assert!(f.is_reportable());
        assert!(f.notes.is_empty());
    }

    #[test]
    fn test_exhausted_notes_inconclusive() {
        let f = classify("http://t.test", &candidate(), &transcript(&["1'"]), TerminalState::Exhausted, 2);
        assert_eq!(f.status, FindingStatus::PotentialBlocked);
        assert_eq!(f.terminal_state, TerminalState::Exhausted);
        assert!(f.notes.iter().any(|n| n == INCONCLUSIVE_NOTE));
    }

    #[test]
    fn test_false_positive_not_reportable_and_empty_poc() {
        let f = classify("http://t.test", &candidate(), &ExploitationTranscript::new("id"), TerminalState::FalsePositive, 3);
        assert!(!f.is_reportable());
        assert_eq!(f.severity, Severity::Info);
        assert_eq!(f.proof_of_concept, "");
    }

    #[test]
    fn test_deterministic() {
        let t = transcript(&["1'"]);
        let a = classify("http://t.test", &candidate(), &t, TerminalState::PotentialBlocked, 1);
        let b = classify("http://t.test", &candidate(), &t, TerminalState::PotentialBlocked, 1);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
