mod common;

use blackshannon::errors::ScanError;
use blackshannon::llm::Role;
use blackshannon::pipeline::{PipelineStage, ScanOrchestrator};
use common::{probe, verdict, ScriptedBackend};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn two_parameter_target() -> MockServer {
    let server = MockServer::start().await;
    for name in ["a", "b"] {
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param(name, "1'"))
            .respond_with(ResponseTemplate::new(500).set_body_string(common::MYSQL_ERROR))
            .with_priority(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Server", "nginx/1.18.0")
                .set_body_string("<html><ul><li>one</li></ul></html>"),
        )
        .with_priority(5)
        .mount(&server)
        .await;
    server
}

/// Parameter `a` is exploited on the second turn; `b` turns out to be an
/// echo of the quote.
fn capable_backend() -> std::sync::Arc<ScriptedBackend> {
    ScriptedBackend::new("capable", |messages| {
        let opening = messages.get(1).map(|m| m.content.as_str()).unwrap_or_default();
        let turn = messages.iter().filter(|m| m.role == Role::Assistant).count();
        let reply = if opening.contains("`a`") {
            match turn {
                0 => probe("1 UNION SELECT NULL"),
                _ => verdict("exploited", Some("1 UNION SELECT user()"), "Database user is app@localhost"),
            }
        } else {
            verdict("false_positive", None, "quote is reflected verbatim")
        };
        Ok(reply)
    })
}

#[tokio::test]
async fn test_scan_writes_report_and_raw_logs() {
    let server = two_parameter_target().await;
    let target = format!("{}/list?a=1&b=1", server.uri());
    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());

    let router = common::router(common::triage_backend(), capable_backend());
    let orchestrator = ScanOrchestrator::with_router(config, &target, router)
        .unwrap()
        .with_scan_id("scan-under-test");
    let outcome = orchestrator.run().await.unwrap();

    let report = &outcome.report;
    assert_eq!(report.stage, PipelineStage::Finished);
    assert_eq!(report.parameters_tested, 2);
    assert_eq!(report.findings.len(), 2);
    let counts = report.counts();
    assert_eq!(counts.exploited, 1);
    assert_eq!(counts.false_positives, 1);
    assert_eq!(report.usage.capable.calls, 3);
    assert_eq!(report.usage.inexpensive.calls, 2);

    let scan_dir = dir.path().join("scan-under-test");
    assert_eq!(outcome.paths.markdown, scan_dir.join("report.md"));

    let markdown = std::fs::read_to_string(scan_dir.join("report.md")).unwrap();
    assert!(markdown.contains("SQLI-001"));
    assert!(markdown.contains("**Risk level:**"));
    assert!(markdown.contains("1 UNION SELECT user()"));
    assert!(markdown.contains("## Appendix: Run Statistics"));

    let findings: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(scan_dir.join("findings.json")).unwrap()).unwrap();
    let findings = findings.as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["parameter"], "a");
    assert_eq!(findings[0]["status"], "EXPLOITED");

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(scan_dir.join("audit/raw_findings.json")).unwrap()).unwrap();
    assert_eq!(raw.as_array().unwrap().len(), 2);

    let workflow = std::fs::read_to_string(scan_dir.join("audit/workflow.log")).unwrap();
    assert!(workflow.contains("Fingerprinting started"));
    assert!(workflow.contains("Report written"));

    assert!(scan_dir.join("audit/transcripts/001_a.jsonl").exists());
    let second = std::fs::read_to_string(scan_dir.join("audit/transcripts/002_b.jsonl")).unwrap();
    assert!(second.lines().count() >= 2);
}

#[tokio::test]
async fn test_unreachable_scan_still_writes_partial_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());
    let capable = ScriptedBackend::conversation("capable", vec![probe("unused")]);
    let router = common::router(common::triage_backend(), capable.clone());

    let orchestrator = ScanOrchestrator::with_router(config, "http://127.0.0.1:9/items?id=1", router)
        .unwrap()
        .with_scan_id("dead-target");
    let err = orchestrator.run().await.err().unwrap();
    assert!(matches!(err, ScanError::Unreachable(_)));
    assert_eq!(capable.calls(), 0);

    let markdown = std::fs::read_to_string(dir.path().join("dead-target/report.md")).unwrap();
    assert!(markdown.contains("## Degraded Sections"));
}

#[tokio::test]
async fn test_invalid_target_is_rejected_before_traffic() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());
    let router = common::router(common::triage_backend(), common::triage_backend());
    let result = ScanOrchestrator::with_router(config, "ftp://shop.test/", router);
    assert!(matches!(result.err(), Some(ScanError::InvalidTarget(_))));
}

#[tokio::test]
async fn test_cancelled_scan_reports_degraded_run() {
    let server = two_parameter_target().await;
    let target = format!("{}/list?a=1&b=1", server.uri());
    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());

    let router = common::router(common::triage_backend(), capable_backend());
    let orchestrator = ScanOrchestrator::with_router(config, &target, router)
        .unwrap()
        .with_scan_id("cancelled");
    orchestrator.cancel();
    let outcome = orchestrator.run().await.unwrap();

    assert!(outcome.report.findings.is_empty());
    assert!(outcome
        .report
        .degraded
        .iter()
        .any(|d| d == "Scan was cancelled before completion"));
    let markdown = std::fs::read_to_string(dir.path().join("cancelled/report.md")).unwrap();
    assert!(markdown.contains("Scan was cancelled before completion"));
}
