use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::context::{preflight_templates, PipelineContext};
use super::injection::{InjectionPipeline, PipelineRun};
use crate::audit::AuditSession;
use crate::config::BlackShannonConfig;
use crate::errors::{RetryPolicy, ScanError};
use crate::fingerprint::{FingerprintEngine, TechnologyProfile};
use crate::llm::{HybridRouter, UsageTracker};
use crate::models::ScanReport;
use crate::probe::forms::origin;
use crate::probe::ProbeClient;
use crate::prompts::PromptLoader;
use crate::reporting::{write_report, ReportPaths};

/// Result of a completed scan: the report and where it was written.
pub struct ScanOutcome {
    pub report: ScanReport,
    pub paths: ReportPaths,
}

/// Runs one target end to end: pre-flight, fingerprint, detect/exploit,
/// classify, raw logs, report.
pub struct ScanOrchestrator {
    config: BlackShannonConfig,
    target: String,
    scan_id: String,
    client: ProbeClient,
    router: Arc<HybridRouter>,
    prompts: Arc<PromptLoader>,
    usage: Arc<UsageTracker>,
    cancel_token: CancellationToken,
}

impl ScanOrchestrator {
    /// Validates the target and builds every collaborator. Missing
    /// credentials and bad URLs fail here, before any traffic.
    pub fn new(config: BlackShannonConfig, target: &str) -> Result<Self, ScanError> {
        let router = Arc::new(HybridRouter::from_config(&config.llm)?);
        Self::with_router(config, target, router)
    }

    /// Use an already-built router (scripted backends in tests).
    pub fn with_router(
        config: BlackShannonConfig,
        target: &str,
        router: Arc<HybridRouter>,
    ) -> Result<Self, ScanError> {
        validate_target(target)?;
        let client = ProbeClient::new(&config.target, &config.http)?;
        let prompts = Arc::new(PromptLoader::new(config.output.prompts_dir.as_ref().map(PathBuf::from)));
        Ok(Self {
            scan_id: new_scan_id(target),
            target: target.to_string(),
            config,
            client,
            router,
            prompts,
            usage: Arc::new(UsageTracker::default()),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Replace the orchestrator's cancel token with an external one (e.g. Ctrl-C handler).
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_scan_id(mut self, scan_id: impl Into<String>) -> Self {
        self.scan_id = scan_id.into();
        self
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn scan_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output.directory).join(&self.scan_id)
    }

    /// Run the scan. A target that never answered still gets a partial
    /// report before `Unreachable` is returned.
    pub async fn run(&self) -> Result<ScanOutcome, ScanError> {
        preflight_templates(&self.prompts)?;
        let started_at = Utc::now();
        let scan_dir = self.scan_dir();
        let audit = AuditSession::initialize(&scan_dir, &self.scan_id, &self.target).await?;
        info!(scan_id = %self.scan_id, target = %self.target, "Scan started");

        audit.milestone("Fingerprinting started").await;
        let engine = FingerprintEngine::new(self.client.clone());
        let profile = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                TechnologyProfile::unreachable(&self.target, vec!["Fingerprinting cancelled".to_string()])
            }
            profile = engine.analyze(&self.target) => profile,
        };
        audit
            .milestone(&format!(
                "Fingerprinting complete: {} ({} confidence)",
                profile.summary, profile.overall_confidence
            ))
            .await;

        let ctx = PipelineContext {
            target: self.target.clone(),
            client: self.client.clone(),
            router: self.router.clone(),
            prompts: self.prompts.clone(),
            usage: self.usage.clone(),
            profile: Arc::new(profile.clone()),
            stage_retry: RetryPolicy {
                max_retries: self.config.llm.stage_retries,
                base_delay: Duration::from_millis(self.config.llm.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.config.http.max_retry_delay_ms.max(self.config.llm.retry_base_delay_ms)),
            },
            detection: self.config.detection.clone(),
            max_iterations: self.config.exploitation.max_iterations,
            cancel: self.cancel_token.clone(),
        };
        let mut pipeline = InjectionPipeline::new(ctx);
        if self.config.exploitation.parallel_parameters {
            pipeline = pipeline.parallel(self.config.exploitation.max_concurrency);
        }

        audit.milestone("Detection started").await;
        let run = pipeline.run().await;
        audit
            .milestone(&format!(
                "Pipeline ended in stage {}: {} parameter(s) tested, {} flagged",
                run.stage,
                run.detections.len(),
                run.flagged()
            ))
            .await;

        let findings = run.findings(&self.target);
        for (i, outcome) in run.outcomes.iter().enumerate() {
            audit.record_transcript(i + 1, outcome).await;
        }
        if let Err(e) = audit.record_raw_findings(&findings).await {
            warn!(error = %e, "Failed to write raw findings");
        }

        // Cancellation is reported as a degraded run, not an unreachable target.
        let unreachable = !self.cancel_token.is_cancelled()
            && !profile.is_reachable()
            && run.detections.iter().all(|d| d.probe_status.is_none());
        let report = ScanReport {
            scan_id: self.scan_id.clone(),
            target: self.target.clone(),
            started_at,
            finished_at: Utc::now(),
            degraded: self.degraded_sections(&profile, &run),
            stage: run.stage,
            parameters_tested: run.detections.len(),
            findings,
            profile,
            usage: self.usage.snapshot(),
            requests: self.client.stats(),
        };
        let paths = write_report(&scan_dir, &report).await?;

        let counts = report.counts();
        audit
            .milestone(&format!(
                "Report written: {} exploited, {} potential, {} false positive(s)",
                counts.exploited, counts.potential, counts.false_positives
            ))
            .await;

        if unreachable {
            warn!(target = %self.target, "Target never answered; partial report written");
            return Err(ScanError::Unreachable(format!(
                "{} did not answer any request (partial report at {})",
                self.target,
                paths.markdown.display()
            )));
        }
        info!(scan_id = %self.scan_id, vulnerabilities = counts.vulnerabilities(), "Scan completed");
        Ok(ScanOutcome { report, paths })
    }

    fn degraded_sections(&self, profile: &TechnologyProfile, run: &PipelineRun) -> Vec<String> {
        let mut degraded: Vec<String> = profile
            .degraded
            .iter()
            .map(|note| format!("Fingerprint: {}", note))
            .collect();
        degraded.extend(run.detection_errors().into_iter().map(|e| format!("Detection: {}", e)));
        if self.cancel_token.is_cancelled() {
            degraded.push("Scan was cancelled before completion".to_string());
        }
        degraded
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

/// Only absolute http(s) URLs with a host are accepted.
pub fn validate_target(target: &str) -> Result<(), ScanError> {
    let parsed = reqwest::Url::parse(target)
        .map_err(|e| ScanError::InvalidTarget(format!("{}: {}", target, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScanError::InvalidTarget(format!("{}: scheme must be http or https", target)));
    }
    if parsed.host_str().is_none() {
        return Err(ScanError::InvalidTarget(format!("{}: missing host", target)));
    }
    Ok(())
}

fn new_scan_id(target: &str) -> String {
    let host = origin(target)
        .and_then(|o| o.split("://").nth(1).map(String::from))
        .unwrap_or_else(|| "target".to_string())
        .replace([':', '.'], "-");
    format!(
        "{}_{}_{}",
        host,
        Utc::now().format("%Y%m%d-%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target() {
        assert!(validate_target("http://shop.test/items?id=1").is_ok());
        assert!(validate_target("https://shop.test").is_ok());
        assert!(matches!(validate_target("ftp://shop.test"), Err(ScanError::InvalidTarget(_))));
        assert!(matches!(validate_target("shop.test"), Err(ScanError::InvalidTarget(_))));
    }

    #[test]
    fn test_scan_id_names_host() {
        let id = new_scan_id("http://127.0.0.1:8080/x");
        assert!(id.starts_with("127-0-0-1-8080_"));
    }
}
