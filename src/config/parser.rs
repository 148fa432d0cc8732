use std::path::Path;
use crate::errors::ScanError;
use super::types::BlackShannonConfig;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

pub async fn parse_config(path: &Path) -> Result<BlackShannonConfig, ScanError> {
    if !path.exists() {
        return Err(ScanError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(ScanError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    let yaml: serde_yaml::Value = if content.trim().is_empty() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        serde_yaml::from_str(&content)?
    };

    // JSON Schema validation
    validate_schema(&yaml)?;

    // Parse into typed config
    let config: BlackShannonConfig = serde_yaml::from_value(yaml)?;

    validate_config(&config)?;

    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), ScanError> {
    // Convert YAML value to JSON for schema validation
    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| ScanError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| ScanError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        // Advisory: typed parsing and validate_config decide what is fatal
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// Semantic checks that serde cannot express. Run again after CLI overrides.
pub fn validate_config(config: &BlackShannonConfig) -> Result<(), ScanError> {
    let routing = &config.llm.routing;
    for (name, value) in [
        ("simple_threshold", routing.simple_threshold),
        ("complex_threshold", routing.complex_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ScanError::Config(format!(
                "llm.routing.{name} must be within [0, 1], got {value}"
            )));
        }
    }
    if routing.simple_threshold > routing.complex_threshold {
        return Err(ScanError::Config(format!(
            "llm.routing.simple_threshold ({}) exceeds complex_threshold ({})",
            routing.simple_threshold, routing.complex_threshold
        )));
    }

    if config.exploitation.max_iterations == 0 {
        return Err(ScanError::Config("exploitation.max_iterations must be at least 1".into()));
    }
    if config.exploitation.max_concurrency == 0 {
        return Err(ScanError::Config("exploitation.max_concurrency must be at least 1".into()));
    }
    if config.target.timeout_secs == 0 || config.llm.timeout_secs == 0 {
        return Err(ScanError::Config("timeouts must be at least one second".into()));
    }

    if config.http.max_retry_delay_ms < config.http.retry_base_delay_ms {
        warn!(
            base = config.http.retry_base_delay_ms,
            max = config.http.max_retry_delay_ms,
            "http.max_retry_delay_ms is below the base delay, backoff will be flat"
        );
    }

    Ok(())
}
