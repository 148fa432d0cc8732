use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::errors::{with_retry, RetryPolicy, ScanError};
use crate::fingerprint::TechnologyProfile;
use crate::llm::{HybridRouter, Message, TaskDescriptor, UsageTracker};
use crate::probe::{ProbeClient, ProbeRequest, ProbeResult};
use crate::prompts::{PromptLoader, PromptVariables};

/// Variables every stage template receives from the profile.
pub const PROFILE_VARIABLES: &[&str] = &["TARGET_URL", "TECH_SUMMARY", "DB_DIALECT", "WAF"];

/// Templates the pipeline renders and the extra variables it supplies to each.
pub const STAGE_TEMPLATES: &[(&str, &[&str])] = &[
    ("system/injection-detect", &[]),
    (
        "tasks/injection-detect",
        &[
            "PARAMETER",
            "LOCATION",
            "METHOD",
            "ENDPOINT",
            "BASELINE_STATUS",
            "BASELINE_LENGTH",
            "PROBE_PAYLOAD",
            "PROBE_STATUS",
            "PROBE_LENGTH",
            "SIMILARITY",
            "DB_ERRORS",
            "PROBE_BODY",
        ],
    ),
    ("system/injection-exploit", &["MAX_ITERATIONS"]),
    (
        "tasks/injection-exploit",
        &["PARAMETER", "LOCATION", "METHOD", "ENDPOINT", "BASELINE_VALUE", "DETECTION_REASON"],
    ),
    (
        "tasks/injection-exploit-step",
        &["ITERATION", "MAX_ITERATIONS", "PAYLOAD", "STATUS", "LENGTH", "ELAPSED_MS", "BODY"],
    ),
];

/// Render every stage template with placeholder values so an unresolved
/// `{{NAME}}` is reported before the target is contacted.
pub fn preflight_templates(prompts: &PromptLoader) -> Result<(), ScanError> {
    let owned: Vec<(&str, Vec<&str>)> = STAGE_TEMPLATES
        .iter()
        .map(|(name, extra)| (*name, PROFILE_VARIABLES.iter().chain(extra.iter()).copied().collect()))
        .collect();
    let templates: Vec<(&str, &[&str])> = owned.iter().map(|(name, vars)| (*name, vars.as_slice())).collect();
    prompts.preflight(&templates)
}

/// Everything one pipeline run needs. Immutable apart from the probe
/// session and the shared usage counters.
#[derive(Clone)]
pub struct PipelineContext {
    pub target: String,
    pub client: ProbeClient,
    pub router: Arc<HybridRouter>,
    pub prompts: Arc<PromptLoader>,
    pub usage: Arc<UsageTracker>,
    pub profile: Arc<TechnologyProfile>,
    pub stage_retry: RetryPolicy,
    pub detection: DetectionConfig,
    pub max_iterations: u32,
    pub cancel: CancellationToken,
}

impl PipelineContext {
    /// Copy of this context bound to a fresh cookie jar.
    pub fn forked(&self) -> Result<Self, ScanError> {
        Ok(Self {
            client: self.client.fork_session()?,
            ..self.clone()
        })
    }

    /// Target and stack variables shared by every template. An unreachable
    /// target contributes no stack hints.
    pub fn profile_variables(&self) -> PromptVariables {
        let profile = &self.profile;
        let mut vars = PromptVariables::new();
        vars.insert("TARGET_URL".into(), self.target.clone());
        let summary = if profile.is_reachable() {
            profile.summary.clone()
        } else {
            "unknown (fingerprinting failed)".to_string()
        };
        vars.insert("TECH_SUMMARY".into(), summary);
        vars.insert(
            "DB_DIALECT".into(),
            profile.database_dialect().unwrap_or("unknown").to_string(),
        );
        let waf = match &profile.waf {
            Some(waf) if profile.waf_detected() => format!("{} ({} confidence)", waf.waf_type, waf.confidence),
            _ => "none detected".to_string(),
        };
        vars.insert("WAF".into(), waf);
        vars
    }

    pub fn render(&self, template: &str, extra: &[(&str, String)]) -> Result<String, ScanError> {
        let mut vars = self.profile_variables();
        for (name, value) in extra {
            vars.insert(name.to_string(), value.clone());
        }
        self.prompts.render(template, &vars)
    }

    /// One backend round trip, retried at the stage boundary. Returns the
    /// label of the backend that answered together with its reply.
    pub async fn converse(
        &self,
        task: TaskDescriptor,
        messages: &[Message],
        operation: &str,
    ) -> Result<(String, String), ScanError> {
        let handle = self.router.select(&task);
        let label = handle.label();
        debug!(operation, backend = %label, messages = messages.len(), "Backend call");

        let call = with_retry(operation, &self.stage_retry, || {
            let handle = handle.clone();
            let usage = self.usage.clone();
            async move {
                let result = handle.backend.converse(messages).await;
                usage.record(handle.tier, result.is_ok());
                result
            }
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled(format!("{} cancelled", operation))),
            reply = call => reply.map(|text| (label, text)),
        }
    }

    pub async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ScanError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled(format!("{} cancelled", request.describe()))),
            result = self.client.probe(request) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_pass_preflight() {
        preflight_templates(&PromptLoader::builtin()).unwrap();
    }

    #[test]
    fn test_override_with_unknown_placeholder_fails_preflight() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tasks")).unwrap();
        std::fs::write(dir.path().join("tasks/injection-exploit.txt"), "Try {{PARAMETER}} as {{USERNAME}}").unwrap();
        let loader = PromptLoader::new(Some(dir.path().to_path_buf()));
        let err = preflight_templates(&loader).unwrap_err();
        assert!(matches!(err, ScanError::Template(_)));
        assert!(err.to_string().contains("USERNAME"));
    }
}
