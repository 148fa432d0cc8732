use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "target": {
                "type": "object",
                "properties": {
                    "timeout_secs": { "type": "integer", "minimum": 1 },
                    "verify_ssl": { "type": "boolean" },
                    "max_redirects": { "type": "integer", "minimum": 0 }
                }
            },
            "http": {
                "type": "object",
                "properties": {
                    "max_retries": { "type": "integer", "minimum": 0 },
                    "retry_base_delay_ms": { "type": "integer", "minimum": 0 },
                    "max_retry_delay_ms": { "type": "integer", "minimum": 0 },
                    "min_interval_ms": { "type": "integer", "minimum": 0 },
                    "user_agents": { "type": "array", "items": { "type": "string" } },
                    "accept_languages": { "type": "array", "items": { "type": "string" } }
                }
            },
            "llm": {
                "type": "object",
                "properties": {
                    "strategy": { "type": "string", "enum": ["hybrid", "inexpensive", "capable"] },
                    "inexpensive": { "$ref": "#/$defs/backend" },
                    "capable": { "$ref": "#/$defs/backend" },
                    "balanced": { "$ref": "#/$defs/backend" },
                    "routing": {
                        "type": "object",
                        "properties": {
                            "simple_threshold": { "type": "number", "minimum": 0, "maximum": 1 },
                            "complex_threshold": { "type": "number", "minimum": 0, "maximum": 1 }
                        }
                    },
                    "timeout_secs": { "type": "integer", "minimum": 1 },
                    "stage_retries": { "type": "integer", "minimum": 0 },
                    "retry_base_delay_ms": { "type": "integer", "minimum": 0 }
                }
            },
            "detection": {
                "type": "object",
                "properties": {
                    "fallback_parameters": { "type": "array", "items": { "type": "string" } },
                    "max_candidates": { "type": "integer", "minimum": 1 }
                }
            },
            "exploitation": {
                "type": "object",
                "properties": {
                    "max_iterations": { "type": "integer", "minimum": 1 },
                    "parallel_parameters": { "type": "boolean" },
                    "max_concurrency": { "type": "integer", "minimum": 1 }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" },
                    "prompts_dir": { "type": "string" }
                }
            }
        },
        "$defs": {
            "backend": {
                "type": "object",
                "required": ["provider"],
                "properties": {
                    "provider": { "type": "string", "enum": ["anthropic", "openai", "deepseek", "local"] },
                    "model": { "type": "string" },
                    "api_key": { "type": "string" },
                    "base_url": { "type": "string" }
                }
            }
        }
    })
});
