//! Detection stage: one structural probe per injection point, triaged by
//! the inexpensive backend.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::PipelineContext;
use super::state::CandidateParameter;
use crate::config::DetectionConfig;
use crate::errors::ScanError;
use crate::fingerprint::signatures::database_error_matches;
use crate::llm::{extract_json, Message, TaskDescriptor};
use crate::probe::forms::{extract_forms, split_query};
use crate::probe::{ProbeRequest, ProbeResult};
use crate::utils::similarity::similarity_ratio;
use crate::utils::truncation::{truncate_chars, MAX_BODY_EXCERPT};

/// Appended to the original value for the structural probe.
pub const STRUCTURAL_SUFFIX: &str = "'";

/// Hidden fields with these fragments are session plumbing, not data.
const TOKEN_FIELD_HINTS: &[&str] = &["csrf", "token", "nonce", "__viewstate", "__eventvalidation"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionVerdict {
    pub vulnerable: bool,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub candidate: CandidateParameter,
    pub probe_status: Option<u16>,
    pub db_errors: Vec<String>,
    pub verdict: Option<DetectionVerdict>,
    /// Why no verdict could be reached, when it could not.
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn flagged(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.vulnerable)
    }
}

/// Injection points on the target page: URL query pairs first, then form
/// fields. Falls back to guessing common parameter names when the page
/// offers none (or could not be fetched).
pub fn enumerate_candidates(
    target: &str,
    page: Option<&ProbeResult>,
    config: &DetectionConfig,
) -> Vec<CandidateParameter> {
    let (endpoint, pairs) = split_query(target);
    let mut seen = BTreeSet::new();
    let mut candidates = Vec::new();

    for (name, _) in &pairs {
        let candidate = CandidateParameter::from_query(&endpoint, &pairs, name);
        if seen.insert(candidate.key()) {
            candidates.push(candidate);
        }
    }

    if let Some(page) = page {
        let page_url = if page.final_url.is_empty() { target } else { page.final_url.as_str() };
        for form in extract_forms(&page.body, page_url) {
            for field in &form.fields {
                if field.hidden && is_token_field(&field.name) {
                    continue;
                }
                let candidate = CandidateParameter::from_form(&form, &field.name);
                if seen.insert(candidate.key()) {
                    candidates.push(candidate);
                }
            }
        }
    }

    if candidates.is_empty() {
        debug!(target, "No injection points on page, using fallback parameters");
        for name in &config.fallback_parameters {
            let candidate = CandidateParameter::guessed(&endpoint, name);
            if seen.insert(candidate.key()) {
                candidates.push(candidate);
            }
        }
    }

    candidates.truncate(config.max_candidates);
    candidates
}

fn is_token_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TOKEN_FIELD_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Read the backend's triage answer. JSON first, then a keyword reading of
/// free text so a chatty model still yields a decision.
pub fn parse_detection_reply(reply: &str) -> DetectionVerdict {
    if let Ok(json) = extract_json(reply) {
        let vulnerable = match json.get("vulnerable") {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => Some(matches!(s.to_ascii_lowercase().as_str(), "true" | "yes")),
            _ => None,
        };
        if let Some(vulnerable) = vulnerable {
            let confidence = json
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(if vulnerable { 0.5 } else { 0.0 })
                .clamp(0.0, 1.0);
            let reason = json
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return DetectionVerdict { vulnerable, confidence, reason };
        }
    }

    let lower = reply.to_ascii_lowercase();
    let negated = ["not vulnerable", "no injection", "not injectable", "no sql injection"]
        .iter()
        .any(|phrase| lower.contains(phrase));
    let vulnerable = !negated && (lower.contains("vulnerable") || lower.contains("injectable"));
    DetectionVerdict {
        vulnerable,
        confidence: if vulnerable { 0.5 } else { 0.0 },
        reason: truncate_chars(reply.trim(), 200),
    }
}

/// Run detection over every candidate. Errors stay local to their parameter.
pub async fn detect(ctx: &PipelineContext) -> Vec<DetectionResult> {
    let page = match ctx.probe(&ProbeRequest::get(ctx.target.clone())).await {
        Ok(page) => Some(page),
        Err(e) => {
            warn!(target = %ctx.target, error = %e, "Target page unavailable, probing fallback parameters");
            None
        }
    };

    let candidates = enumerate_candidates(&ctx.target, page.as_ref(), &ctx.detection);
    info!(target = %ctx.target, count = candidates.len(), "Detecting injection points");

    let mut results = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let result = detect_parameter(ctx, candidate, page.as_ref()).await;
        match (&result.verdict, &result.error) {
            (Some(v), _) => info!(
                parameter = %result.candidate.name,
                vulnerable = v.vulnerable,
                confidence = v.confidence,
                "Detection verdict"
            ),
            (None, Some(e)) => warn!(parameter = %result.candidate.name, error = %e, "Detection inconclusive"),
            (None, None) => {}
        }
        results.push(result);
    }
    results
}

async fn detect_parameter(
    ctx: &PipelineContext,
    candidate: CandidateParameter,
    page: Option<&ProbeResult>,
) -> DetectionResult {
    let mut result = DetectionResult {
        candidate,
        probe_status: None,
        db_errors: Vec::new(),
        verdict: None,
        error: None,
    };

    let payload = format!("{}{}", result.candidate.original_value, STRUCTURAL_SUFFIX);
    let probe = match ctx.probe(&result.candidate.request_with(&payload)).await {
        Ok(probe) => probe,
        Err(e) => {
            result.error = Some(format!("structural probe failed: {}", e));
            return result;
        }
    };
    result.probe_status = Some(probe.status);
    result.db_errors = database_error_matches(&probe.body)
        .into_iter()
        .map(|(db, _)| db.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    match triage(ctx, &result, &payload, &probe, page).await {
        Ok(verdict) => result.verdict = Some(verdict),
        Err(e) => result.error = Some(e.to_string()),
    }
    result
}

async fn triage(
    ctx: &PipelineContext,
    result: &DetectionResult,
    payload: &str,
    probe: &ProbeResult,
    page: Option<&ProbeResult>,
) -> Result<DetectionVerdict, ScanError> {
    let candidate = &result.candidate;
    let (baseline_status, baseline_length, similarity) = match page {
        Some(page) => (
            page.status.to_string(),
            page.body.len().to_string(),
            format!("{:.2}", similarity_ratio(&page.body, &probe.body)),
        ),
        None => ("unavailable".to_string(), "unavailable".to_string(), "n/a".to_string()),
    };
    let db_errors = if result.db_errors.is_empty() {
        "none".to_string()
    } else {
        result.db_errors.join(", ")
    };

    let system = ctx.render("system/injection-detect", &[])?;
    let task = ctx.render(
        "tasks/injection-detect",
        &[
            ("PARAMETER", candidate.name.clone()),
            ("LOCATION", candidate.location.to_string()),
            ("METHOD", candidate.method.to_string()),
            ("ENDPOINT", candidate.endpoint.clone()),
            ("BASELINE_STATUS", baseline_status),
            ("BASELINE_LENGTH", baseline_length),
            ("PROBE_PAYLOAD", payload.to_string()),
            ("PROBE_STATUS", probe.status.to_string()),
            ("PROBE_LENGTH", probe.body.len().to_string()),
            ("SIMILARITY", similarity),
            ("DB_ERRORS", db_errors),
            ("PROBE_BODY", truncate_chars(&probe.body, MAX_BODY_EXCERPT)),
        ],
    )?;

    let messages = [Message::system(system), Message::user(task)];
    let operation = format!("detect:{}", candidate.name);
    let (_, reply) = ctx.converse(TaskDescriptor::detection(), &messages, &operation).await?;
    Ok(parse_detection_reply(&reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize) -> DetectionConfig {
        DetectionConfig {
            fallback_parameters: vec!["id".into(), "q".into()],
            max_candidates: max,
        }
    }

    #[test]
    fn test_query_parameters_come_first() {
        let page = ProbeResult::captured(
            "GET /",
            200,
            &[],
            r#"<form method="post" action="/search"><input name="term"><input type="hidden" name="csrf_token" value="x"></form>"#,
        );
        let candidates = enumerate_candidates("http://t.test/items?id=1&sort=asc", Some(&page), &config(20));
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "sort", "term"]);
        assert_eq!(candidates[2].endpoint, "http://t.test/search");
    }

    #[test]
    fn test_fallback_parameters_when_page_has_none() {
        let candidates = enumerate_candidates("http://t.test/", None, &config(20));
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "q"]);
        assert_eq!(candidates[0].original_value, "1");
    }

    #[test]
    fn test_candidates_capped() {
        let candidates = enumerate_candidates("http://t.test/?a=1&b=2&c=3", None, &config(2));
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_parse_json_reply() {
        let v = parse_detection_reply(
            "```json\n{\"vulnerable\": true, \"confidence\": 0.9, \"reason\": \"MySQL syntax error\"}\n```",
        );
        assert!(v.vulnerable);
        assert_eq!(v.confidence, 0.9);
        assert_eq!(v.reason, "MySQL syntax error");
    }

    #[test]
    fn test_parse_string_bool_and_clamp() {
        let v = parse_detection_reply(r#"{"vulnerable": "yes", "confidence": 3}"#);
        assert!(v.vulnerable);
        assert_eq!(v.confidence, 1.0);
    }

    #[test]
    fn test_parse_free_text() {
        assert!(parse_detection_reply("This parameter looks injectable.").vulnerable);
        assert!(!parse_detection_reply("The parameter is not vulnerable.").vulnerable);
        assert!(!parse_detection_reply("I cannot tell.").vulnerable);
    }
}
