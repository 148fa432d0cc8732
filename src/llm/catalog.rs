pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub env_var: &'static str,
    pub base_url: &'static str,
    pub default_model: &'static str,
    /// Wire format spoken by the provider.
    pub api: ApiFlavor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    Anthropic,
    OpenAiCompatible,
}

pub static PROVIDERS: &[ProviderInfo] = &[
    ProviderInfo {
        id: "anthropic",
        name: "Anthropic",
        env_var: "ANTHROPIC_API_KEY",
        base_url: "https://api.anthropic.com",
        default_model: "claude-sonnet-4-5-20250929",
        api: ApiFlavor::Anthropic,
    },
    ProviderInfo {
        id: "deepseek",
        name: "DeepSeek",
        env_var: "DEEPSEEK_API_KEY",
        base_url: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
        api: ApiFlavor::OpenAiCompatible,
    },
    ProviderInfo {
        id: "openai",
        name: "OpenAI",
        env_var: "OPENAI_API_KEY",
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o",
        api: ApiFlavor::OpenAiCompatible,
    },
    ProviderInfo {
        id: "local",
        name: "Local / Ollama",
        env_var: "",
        base_url: "http://localhost:11434/v1",
        default_model: "qwen2.5-coder:1.5b",
        api: ApiFlavor::OpenAiCompatible,
    },
];

pub fn get_provider(id: &str) -> Option<&'static ProviderInfo> {
    PROVIDERS.iter().find(|p| p.id == id)
}

impl ProviderInfo {
    /// Local servers run without a key.
    pub fn requires_key(&self) -> bool {
        !self.env_var.is_empty()
    }
}
