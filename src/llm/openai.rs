use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use crate::config::credentials::redact_credentials;
use crate::errors::ScanError;
use super::provider::{status_error, Backend};
use super::types::Message;
use tracing::debug;

/// Chat-completions backend. Serves OpenAI, DeepSeek and local Ollama servers.
pub struct OpenAiCompatibleBackend {
    client: Client,
    provider: String,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        provider: &str,
        api_key: Option<&str>,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ScanError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::Config(format!("Failed to build {} client: {}", provider, e)))?;
        Ok(Self {
            client,
            provider: provider.to_string(),
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Backend for OpenAiCompatibleBackend {
    async fn converse(&self, messages: &[Message]) -> Result<String, ScanError> {
        let turns: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let body = json!({
            "model": self.model,
            "messages": turns,
            "max_tokens": 4096,
        });

        let mut request = self.client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let resp = request.send().await.map_err(|e| {
            let secrets: Vec<&str> = self.api_key.iter().map(String::as_str).collect();
            let msg = redact_credentials(&e.to_string(), &secrets);
            ScanError::BackendUnavailable(format!("{} request failed: {}", self.provider, msg))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(status_error(&self.provider, status, &detail));
        }

        let data: Value = resp.json().await
            .map_err(|e| ScanError::BackendMalformed(format!("Failed to parse {} response: {}", self.provider, e)))?;

        if let Some(error) = data.get("error") {
            return Err(ScanError::BackendUnavailable(
                error["message"].as_str().unwrap_or("Unknown").to_string(),
            ));
        }

        let content = data["choices"][0]["message"]["content"].as_str()
            .ok_or_else(|| ScanError::BackendMalformed(format!("No content in {} response", self.provider)))?
            .to_string();

        debug!(
            provider = %self.provider,
            model = %self.model,
            input_tokens = data["usage"]["prompt_tokens"].as_u64(),
            output_tokens = data["usage"]["completion_tokens"].as_u64(),
            "Chat completion"
        );

        Ok(content)
    }

    fn provider_name(&self) -> &str { &self.provider }
    fn model_name(&self) -> &str { &self.model }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_converse_sends_bearer_and_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer ds-key-1234"))
            .and(body_partial_json(json!({"model": "deepseek-chat"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"vulnerable\": true}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(
            "deepseek", Some("ds-key-1234"), "deepseek-chat", &server.uri(), Duration::from_secs(5),
        ).unwrap();
        let reply = backend.converse(&[Message::system("s"), Message::user("u")]).await.unwrap();
        assert_eq!(reply, "{\"vulnerable\": true}");
        assert_eq!(backend.provider_name(), "deepseek");
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(
            "local", None, "qwen", &server.uri(), Duration::from_secs(5),
        ).unwrap();
        let err = backend.converse(&[Message::user("u")]).await.unwrap_err();
        assert!(matches!(err, ScanError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let backend = OpenAiCompatibleBackend::new(
            "openai", Some("sk-secret-value"), "gpt-4o", "http://127.0.0.1:9", Duration::from_secs(2),
        ).unwrap();
        let err = backend.converse(&[Message::user("u")]).await.unwrap_err();
        assert!(matches!(err, ScanError::BackendUnavailable(_)));
        assert!(!err.to_string().contains("sk-secret-value"));
    }
}
