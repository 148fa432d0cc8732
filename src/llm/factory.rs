use std::sync::Arc;
use std::time::Duration;

use crate::config::credentials::resolve_credential;
use crate::config::BackendConfig;
use crate::errors::ScanError;
use super::anthropic::AnthropicBackend;
use super::catalog::{self, ApiFlavor};
use super::openai::OpenAiCompatibleBackend;
use super::provider::Backend;

/// Build one backend from its configuration block. Fails with a configuration
/// error when the provider is unknown or a remote provider has no API key.
pub fn create_backend(
    config: &BackendConfig,
    timeout: Duration,
) -> Result<Arc<dyn Backend>, ScanError> {
    let info = catalog::get_provider(&config.provider).ok_or_else(|| {
        ScanError::Config(format!(
            "Unknown backend provider '{}' (anthropic, deepseek, openai, local)",
            config.provider
        ))
    })?;

    let api_key = config
        .api_key
        .as_deref()
        .and_then(resolve_credential)
        .or_else(|| {
            if info.env_var.is_empty() {
                None
            } else {
                std::env::var(info.env_var).ok().filter(|k| !k.is_empty())
            }
        });

    if info.requires_key() && api_key.is_none() {
        return Err(ScanError::Config(format!(
            "No API key for {} backend: set api_key in the config or export {}",
            info.name, info.env_var
        )));
    }

    let model = config.model.as_deref().unwrap_or(info.default_model);
    let base_url = config.base_url.as_deref().unwrap_or(info.base_url);

    match info.api {
        ApiFlavor::Anthropic => Ok(Arc::new(AnthropicBackend::new(
            api_key.as_deref().unwrap_or_default(),
            model,
            base_url,
            timeout,
        )?)),
        ApiFlavor::OpenAiCompatible => Ok(Arc::new(OpenAiCompatibleBackend::new(
            info.id,
            api_key.as_deref(),
            model,
            base_url,
            timeout,
        )?)),
    }
}
