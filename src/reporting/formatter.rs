use crate::fingerprint::TechnologyProfile;
use crate::llm::UsageSummary;
use crate::models::{Finding, FindingStatus, ScanReport};
use crate::utils::formatting::{format_duration, table_cell};

use super::metadata::{build_timestamp, tool_version};

pub fn format_finding_markdown(finding: &Finding) -> String {
    let mut out = format!(
        "### {}: {}\n\n**Status:** {}  \n**Severity:** {}  \n**Endpoint:** `{} {}`  \n**Parameter:** `{}` ({})  \n**CWE:** {}\n\n{}\n",
        finding.id,
        finding.title,
        finding.status,
        finding.severity,
        finding.method,
        finding.endpoint,
        finding.parameter,
        finding.location,
        finding.cwe,
        finding.description,
    );
    if !finding.proof_of_concept.is_empty() {
        out.push_str(&format!("\n**Proof of concept:**\n```\n{}\n```\n", finding.proof_of_concept));
    }
    if let Some(extracted) = &finding.extracted {
        out.push_str(&format!("\n**Extracted:** {}\n", extracted));
    }
    if !finding.evidence.is_empty() {
        out.push_str(&format!("\n**Evidence:**\n```\n{}\n```\n", finding.evidence));
    }
    for note in &finding.notes {
        out.push_str(&format!("\n> {}\n", note));
    }
    out.push_str(&format!("\n**Remediation:** {}\n", finding.remediation));
    out
}

pub fn format_executive_summary(report: &ScanReport) -> String {
    let counts = report.counts();
    let risk = report
        .risk_level()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "None identified".to_string());
    format!(
        "## Executive Summary\n\n**Risk level:** {}\n\n| Status | Count |\n|---|---|\n| Exploited | {} |\n| Potential | {} |\n| **Vulnerabilities** | **{}** |\n\n{} parameter(s) tested; pipeline ended in stage `{}`. {} false positive(s) were dismissed and kept in the raw logs.\n",
        risk,
        counts.exploited,
        counts.potential,
        counts.vulnerabilities(),
        report.parameters_tested,
        report.stage,
        counts.false_positives,
    )
}

pub fn format_profile_table(profile: &TechnologyProfile) -> String {
    let mut rows: Vec<(&str, String)> = Vec::new();
    rows.push(("Overall confidence", profile.overall_confidence.to_string()));
    if let Some(server) = &profile.server {
        rows.push(("Server", format!("{} ({})", server, server.confidence)));
    }
    if let Some(backend) = &profile.backend {
        let value = match &backend.version {
            Some(v) => format!("{} {}", backend.language, v),
            None => backend.language.clone(),
        };
        rows.push(("Language", value));
    }
    if let Some(cms) = &profile.cms {
        let value = match &cms.version {
            Some(v) => format!("{} {} ({})", cms.name, v, cms.confidence),
            None => format!("{} ({})", cms.name, cms.confidence),
        };
        rows.push(("CMS", value));
    }
    if !profile.frameworks.backend.is_empty() {
        let names: Vec<String> = profile
            .frameworks
            .backend
            .iter()
            .map(|f| format!("{} ({})", f.name, f.confidence))
            .collect();
        rows.push(("Backend frameworks", names.join(", ")));
    }
    if !profile.frameworks.frontend.is_empty() {
        let names: Vec<&str> = profile.frameworks.frontend.iter().map(String::as_str).collect();
        rows.push(("Frontend", names.join(", ")));
    }
    if let Some(db) = &profile.database {
        rows.push(("Database", format!("{} ({})", db.db_type, db.confidence)));
    }
    if let Some(waf) = &profile.waf {
        rows.push(("WAF", format!("{} ({})", waf.waf_type, waf.confidence)));
    }
    if !profile.paths_found.is_empty() {
        rows.push(("Paths found", profile.paths_found.join(", ")));
    }

    let mut out = String::from("## Technology Profile\n\n| Component | Detected |\n|---|---|\n");
    for (name, value) in rows {
        out.push_str(&format!("| {} | {} |\n", name, table_cell(&value)));
    }
    out.push_str(&format!("\n**Stack:** {}\n", profile.summary));
    out
}

fn format_usage(usage: &UsageSummary) -> String {
    let mut out = String::from("| Backend tier | Calls | Failures |\n|---|---|---|\n");
    for (tier, stats) in [
        ("inexpensive", &usage.inexpensive),
        ("balanced", &usage.balanced),
        ("capable", &usage.capable),
    ] {
        out.push_str(&format!("| {} | {} | {} |\n", tier, stats.calls, stats.failures));
    }
    out.push_str(&format!("| total | {} | |\n", usage.total_calls()));
    out
}

/// Full Markdown report. Degraded sections are listed rather than omitted.
pub fn format_report(report: &ScanReport) -> String {
    let mut out = format!(
        "# Security Assessment Report\n\n- Target: {}\n- Scan ID: {}\n- Assessment Date: {}\n- Duration: {}\n- Tool: BlackShannon {} (built {})\n\n",
        report.target,
        report.scan_id,
        report.started_at.format("%Y-%m-%d %H:%M UTC"),
        format_duration(report.duration_ms()),
        tool_version(),
        build_timestamp(),
    );
    out.push_str(&format_executive_summary(report));
    out.push_str("\n---\n\n");
    out.push_str(&format_profile_table(&report.profile));

    let reportable = report.reportable();
    for (heading, status) in [
        ("Exploited Vulnerabilities", FindingStatus::Exploited),
        ("Potential Vulnerabilities", FindingStatus::PotentialBlocked),
    ] {
        let section: Vec<&&Finding> = reportable.iter().filter(|f| f.status == status).collect();
        if section.is_empty() {
            continue;
        }
        out.push_str(&format!("\n---\n\n## {}\n\n", heading));
        for finding in section {
            out.push_str(&format_finding_markdown(finding));
            out.push('\n');
        }
    }
    if reportable.is_empty() {
        out.push_str("\n---\n\nNo exploitable vulnerabilities were found during this assessment.\n");
    }

    if !report.degraded.is_empty() {
        out.push_str("\n---\n\n## Degraded Sections\n\n");
        for note in &report.degraded {
            out.push_str(&format!("- {}\n", note));
        }
    }

    out.push_str("\n---\n\n## Appendix: Run Statistics\n\n");
    out.push_str(&format_usage(&report.usage));
    out.push_str(&format!(
        "\nTarget requests: {} ({} retries, {} failed)\n",
        report.requests.requests, report.requests.retries, report.requests.failures
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::profile::ServerInfo;
    use crate::fingerprint::Confidence;
    use crate::models::Severity;
    use crate::llm::usage::TierUsage;
    use crate::pipeline::state::{CandidateParameter, PipelineStage, TerminalState};
    use crate::pipeline::{classify, ExploitationTranscript};
    use crate::probe::ProbeStats;
    use chrono::Utc;

    fn report(states: &[TerminalState]) -> ScanReport {
        let candidate = CandidateParameter::guessed("http://t.test/items", "id");
        let findings = states
            .iter()
            .enumerate()
            .map(|(i, s)| classify("http://t.test", &candidate, &ExploitationTranscript::new("id"), *s, i + 1))
            .collect();
        let mut profile = TechnologyProfile::unreachable("http://t.test", Vec::new());
        profile.server = Some(ServerInfo {
            name: "nginx".into(),
            version: Some("1.18.0".into()),
            confidence: Confidence::Low,
        });
        ScanReport {
            scan_id: "scan-1".into(),
            target: "http://t.test".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            profile,
            stage: PipelineStage::Finished,
            parameters_tested: states.len(),
            findings,
            usage: UsageSummary::default(),
            requests: ProbeStats::default(),
            degraded: vec!["database detection: probe timed out".into()],
        }
    }

    #[test]
    fn test_false_positives_not_counted() {
        let r = report(&[TerminalState::Exploited, TerminalState::FalsePositive, TerminalState::Exhausted]);
        let counts = r.counts();
        assert_eq!(counts.vulnerabilities(), 2);
        assert_eq!(counts.false_positives, 1);
        assert_eq!(r.risk_level(), Some(Severity::High));

        let md = format_report(&r);
        assert!(md.contains("| **Vulnerabilities** | **2** |"));
        assert!(md.contains("## Exploited Vulnerabilities"));
        assert!(md.contains("## Potential Vulnerabilities"));
        assert!(!md.contains("No SQL injection in parameter"));
    }

    #[test]
    fn test_report_lists_profile_and_degraded_sections() {
        let md = format_report(&report(&[]));
        assert!(md.contains("| Server | nginx/1.18.0 (low) |"));
        assert!(md.contains("## Degraded Sections"));
        assert!(md.contains("- database detection: probe timed out"));
        assert!(md.contains("No exploitable vulnerabilities were found"));
        assert!(md.contains("**Risk level:** None identified"));
    }

    #[test]
    fn test_usage_table_totals_every_tier() {
        let mut r = report(&[]);
        r.usage.inexpensive = TierUsage { calls: 4, failures: 1 };
        r.usage.capable = TierUsage { calls: 2, failures: 0 };
        let md = format_report(&r);
        assert!(md.contains("| inexpensive | 4 | 1 |"));
        assert!(md.contains("| total | 6 | |"));
    }
}
