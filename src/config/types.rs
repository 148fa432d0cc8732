use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BlackShannonConfig {
    pub target: TargetConfig,
    pub http: HttpConfig,
    pub llm: LlmConfig,
    pub detection: DetectionConfig,
    pub exploitation: ExploitationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    pub timeout_secs: u64,
    pub verify_ssl: bool,
    pub max_redirects: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            verify_ssl: false,
            max_redirects: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Minimum spacing between two requests of one session. Zero disables throttling.
    pub min_interval_ms: u64,
    /// Identity pool rotated per request. Empty means the built-in browser pool.
    pub user_agents: Vec<String>,
    pub accept_languages: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 500,
            max_retry_delay_ms: 8_000,
            min_interval_ms: 500,
            user_agents: Vec::new(),
            accept_languages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Hybrid,
    Inexpensive,
    Capable,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Inexpensive => "inexpensive",
            Self::Capable => "capable",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "inexpensive" | "cheap" => Ok(Self::Inexpensive),
            "capable" => Ok(Self::Capable),
            other => Err(format!("unknown strategy '{other}' (hybrid, inexpensive, capable)")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub strategy: Strategy,
    pub inexpensive: BackendConfig,
    pub capable: BackendConfig,
    pub balanced: Option<BackendConfig>,
    pub routing: RoutingConfig,
    pub timeout_secs: u64,
    /// Extra attempts for a failed backend call before the stage gives up.
    pub stage_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Hybrid,
            inexpensive: BackendConfig::for_provider("deepseek"),
            capable: BackendConfig::for_provider("anthropic"),
            balanced: None,
            routing: RoutingConfig::default(),
            timeout_secs: 120,
            stage_retries: 2,
            retry_base_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BackendConfig {
    pub provider: String,
    pub model: Option<String>,
    /// Literal key or `$ENV_VAR` reference.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl BackendConfig {
    pub fn for_provider(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub simple_threshold: f64,
    pub complex_threshold: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            simple_threshold: 0.3,
            complex_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Parameter names tried as query parameters when the page exposes none.
    pub fallback_parameters: Vec<String>,
    pub max_candidates: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let fallback = [
            "id", "user", "username", "email", "search", "q", "query", "page", "product",
            "category", "item", "order", "sort", "filter", "name", "pid", "uid", "cid",
        ];
        Self {
            fallback_parameters: fallback.iter().map(|s| s.to_string()).collect(),
            max_candidates: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExploitationConfig {
    pub max_iterations: u32,
    pub parallel_parameters: bool,
    pub max_concurrency: usize,
}

impl Default for ExploitationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            parallel_parameters: false,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
    /// Directory whose templates override the built-in prompts.
    pub prompts_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./results".to_string(),
            prompts_dir: None,
        }
    }
}
