#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use blackshannon::config::{BlackShannonConfig, HttpConfig, TargetConfig};
use blackshannon::errors::{RetryPolicy, ScanError};
use blackshannon::fingerprint::TechnologyProfile;
use blackshannon::llm::{Backend, HybridRouter, Message, Role, RoutingThresholds, UsageTracker};
use blackshannon::pipeline::PipelineContext;
use blackshannon::probe::ProbeClient;
use blackshannon::prompts::PromptLoader;

type Script = Box<dyn Fn(&[Message]) -> Result<String, ScanError> + Send + Sync>;

/// In-memory backend whose reply is computed from the conversation so far.
pub struct ScriptedBackend {
    name: &'static str,
    calls: AtomicUsize,
    script: Script,
}

impl ScriptedBackend {
    pub fn new(
        name: &'static str,
        script: impl Fn(&[Message]) -> Result<String, ScanError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self { name, calls: AtomicUsize::new(0), script: Box::new(script) })
    }

    /// Reply `n` of a conversation is `replies[n]`; the last one repeats.
    pub fn conversation(name: &'static str, replies: Vec<String>) -> Arc<Self> {
        Self::new(name, move |messages| {
            let turn = messages.iter().filter(|m| m.role == Role::Assistant).count();
            Ok(replies[turn.min(replies.len() - 1)].clone())
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn converse(&self, messages: &[Message]) -> Result<String, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(messages)
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        self.name
    }
}

/// Flags a parameter exactly when a database error signature was matched
/// on its structural probe.
pub fn triage_backend() -> Arc<ScriptedBackend> {
    ScriptedBackend::new("triage", |messages| {
        let task = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        if task.contains("matched locally: none") {
            Ok(r#"{"vulnerable": false, "confidence": 0.1, "reason": "no anomaly"}"#.to_string())
        } else {
            Ok(r#"{"vulnerable": true, "confidence": 0.9, "reason": "database error on quote"}"#.to_string())
        }
    })
}

pub fn probe(payload: &str) -> String {
    serde_json::json!({ "action": "probe", "payload": payload }).to_string()
}

pub fn verdict(verdict: &str, payload: Option<&str>, summary: &str) -> String {
    serde_json::json!({
        "action": "verdict",
        "verdict": verdict,
        "payload": payload,
        "summary": summary,
    })
    .to_string()
}

pub fn router(inexpensive: Arc<ScriptedBackend>, capable: Arc<ScriptedBackend>) -> Arc<HybridRouter> {
    Arc::new(HybridRouter::new(inexpensive, capable, None, RoutingThresholds::default()))
}

/// No retries, no back-off, no throttling.
pub fn fast_config(output: &Path) -> BlackShannonConfig {
    let mut config = BlackShannonConfig::default();
    config.target = TargetConfig { timeout_secs: 5, ..Default::default() };
    config.http = HttpConfig {
        max_retries: 0,
        retry_base_delay_ms: 0,
        max_retry_delay_ms: 0,
        min_interval_ms: 0,
        ..Default::default()
    };
    config.llm.stage_retries = 0;
    config.llm.retry_base_delay_ms = 0;
    config.output.directory = output.display().to_string();
    config
}

pub fn client(config: &BlackShannonConfig) -> ProbeClient {
    ProbeClient::new(&config.target, &config.http).unwrap()
}

pub fn context(
    target: &str,
    config: &BlackShannonConfig,
    router: Arc<HybridRouter>,
    profile: TechnologyProfile,
) -> PipelineContext {
    PipelineContext {
        target: target.to_string(),
        client: client(config),
        router,
        prompts: Arc::new(PromptLoader::builtin()),
        usage: Arc::new(UsageTracker::default()),
        profile: Arc::new(profile),
        stage_retry: RetryPolicy::immediate(config.llm.stage_retries),
        detection: config.detection.clone(),
        max_iterations: config.exploitation.max_iterations,
        cancel: CancellationToken::new(),
    }
}

pub const MYSQL_ERROR: &str = "<b>Warning</b>: You have an error in your SQL syntax; check the manual that \
corresponds to your MySQL server version for the right syntax to use near ''1''' at line 1";
