use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use crate::config::credentials::redact_credentials;
use crate::errors::ScanError;
use super::provider::{status_error, Backend};
use super::types::{Message, Role};
use tracing::debug;

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(api_key: &str, model: &str, base_url: &str, timeout: Duration) -> Result<Self, ScanError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::Config(format!("Failed to build Anthropic client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The Messages API takes system text out of band.
    fn request_body(&self, messages: &[Message]) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": 4096,
            "messages": turns,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        body
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn converse(&self, messages: &[Message]) -> Result<String, ScanError> {
        let resp = self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| {
                let msg = redact_credentials(&e.to_string(), &[&self.api_key]);
                ScanError::BackendUnavailable(format!("Anthropic API request failed: {}", msg))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(status_error("anthropic", status, &detail));
        }

        let data: Value = resp.json().await
            .map_err(|e| ScanError::BackendMalformed(format!("Failed to parse Anthropic response: {}", e)))?;

        if let Some(error) = data.get("error") {
            let msg = error["message"].as_str().unwrap_or("Unknown error");
            return Err(ScanError::BackendUnavailable(msg.to_string()));
        }

        let content = data["content"][0]["text"].as_str()
            .ok_or_else(|| ScanError::BackendMalformed("No content in Anthropic response".into()))?
            .to_string();

        debug!(
            model = %self.model,
            input_tokens = data["usage"]["input_tokens"].as_u64(),
            output_tokens = data["usage"]["output_tokens"].as_u64(),
            "Anthropic completion"
        );

        Ok(content)
    }

    fn provider_name(&self) -> &str { "anthropic" }
    fn model_name(&self) -> &str { &self.model }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> AnthropicBackend {
        AnthropicBackend::new("sk-ant-test-key", "claude-test", &server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_system_messages_hoisted() {
        let b = AnthropicBackend::new("k", "m", "http://localhost", Duration::from_secs(1)).unwrap();
        let body = b.request_body(&[Message::system("be terse"), Message::user("hi")]);
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_converse_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "{\"action\":\"probe\"}"}],
                "usage": {"input_tokens": 10, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let reply = backend(&server).converse(&[Message::user("go")]).await.unwrap();
        assert_eq!(reply, "{\"action\":\"probe\"}");
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_backend_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = backend(&server).converse(&[Message::user("go")]).await.unwrap_err();
        assert!(matches!(err, ScanError::BackendRateLimited(_)));
    }

    #[tokio::test]
    async fn test_missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let err = backend(&server).converse(&[Message::user("go")]).await.unwrap_err();
        assert!(matches!(err, ScanError::BackendMalformed(_)));
    }
}
