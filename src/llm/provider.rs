use async_trait::async_trait;
use serde_json::Value;
use crate::errors::ScanError;
use super::types::Message;

/// One reasoning backend. Implementations must be shareable across tasks.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send an ordered conversation and return the reply text.
    async fn converse(&self, messages: &[Message]) -> Result<String, ScanError>;

    /// Provider name for logging
    fn provider_name(&self) -> &str;

    /// Model identifier
    fn model_name(&self) -> &str;
}

/// Map a non-success HTTP status from a backend API onto the backend error family.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, detail: &str) -> ScanError {
    let detail = crate::utils::truncation::truncate_chars(detail, 300);
    match status.as_u16() {
        429 => ScanError::BackendRateLimited(format!("{provider} rate limit exceeded: {detail}")),
        401 | 403 => ScanError::BackendUnavailable(format!("{provider} rejected credentials ({status})")),
        _ => ScanError::BackendUnavailable(format!("{provider} returned {status}: {detail}")),
    }
}

/// Pull a JSON object out of a free-form reply: the whole text, a fenced
/// ```json block, or the span between the first `{` and the last `}`.
pub fn extract_json(text: &str) -> Result<Value, ScanError> {
    // Try direct parse first
    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(v);
    }
    // Try extracting from markdown code block
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            let json_str = rest[..end].trim();
            return serde_json::from_str(json_str)
                .map_err(|e| ScanError::Parse(format!("Invalid JSON in code block: {}", e)));
        }
    }
    // Try finding first { to last }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            let json_str = &text[start..=end];
            return serde_json::from_str(json_str)
                .map_err(|e| ScanError::Parse(format!("Invalid JSON extraction: {}", e)));
        }
    }
    Err(ScanError::Parse("No valid JSON found in backend reply".into()))
}
