//! Exploitation stage: a bounded conversation with the capable backend in
//! which every proposed payload is executed and its response fed back.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::PipelineContext;
use super::detection::DetectionResult;
use super::state::{CandidateParameter, TerminalState};
use super::transcript::{ExploitationTranscript, ProbeOutcome, TranscriptTurn};
use crate::errors::ScanError;
use crate::llm::{extract_json, Message, TaskDescriptor};
use crate::utils::truncation::{truncate_chars, truncate_error, MAX_BODY_EXCERPT};

/// What the backend asked for on one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Probe {
        payload: String,
    },
    Verdict {
        state: TerminalState,
        payload: Option<String>,
        summary: String,
        extracted: Option<String>,
    },
}

fn text_field(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn parse_directive(reply: &str) -> Result<Directive, ScanError> {
    let json = extract_json(reply)?;
    let action = text_field(&json, "action").map(|a| a.to_ascii_lowercase());
    let payload = text_field(&json, "payload");

    match action.as_deref() {
        Some("verdict") => {
            let verdict = text_field(&json, "verdict")
                .ok_or_else(|| ScanError::Parse("verdict directive without a verdict".into()))?;
            let state = match verdict.to_ascii_lowercase().as_str() {
                "exploited" | "confirmed" => TerminalState::Exploited,
                "blocked" | "potential" | "potential_blocked" => TerminalState::PotentialBlocked,
                "false_positive" | "not_vulnerable" => TerminalState::FalsePositive,
                other => return Err(ScanError::Parse(format!("unknown verdict '{}'", other))),
            };
            Ok(Directive::Verdict {
                state,
                payload,
                summary: text_field(&json, "summary").unwrap_or_default(),
                extracted: text_field(&json, "extracted"),
            })
        }
        Some("probe") | None => payload
            .map(|payload| Directive::Probe { payload })
            .ok_or_else(|| ScanError::Parse("probe directive without a payload".into())),
        Some(other) => Err(ScanError::Parse(format!("unknown action '{}'", other))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExploitationOutcome {
    pub candidate: CandidateParameter,
    pub terminal: TerminalState,
    pub transcript: ExploitationTranscript,
    pub summary: Option<String>,
    pub extracted: Option<String>,
    pub detection_reason: String,
}

/// Drive one flagged parameter to a terminal state. At most
/// `max_iterations` backend round trips are made.
pub async fn exploit(ctx: &PipelineContext, detection: &DetectionResult) -> ExploitationOutcome {
    let candidate = detection.candidate.clone();
    let detection_reason = detection
        .verdict
        .as_ref()
        .map(|v| v.reason.clone())
        .unwrap_or_default();
    let mut outcome = ExploitationOutcome {
        transcript: ExploitationTranscript::new(candidate.name.clone()),
        candidate,
        terminal: TerminalState::Exhausted,
        summary: None,
        extracted: None,
        detection_reason,
    };

    info!(parameter = %outcome.candidate.name, budget = ctx.max_iterations, "Exploiting parameter");
    match run_loop(ctx, &mut outcome).await {
        Ok(state) => outcome.terminal = state,
        Err(e) => {
            warn!(parameter = %outcome.candidate.name, error = %e, "Exploitation loop aborted");
            outcome.transcript.note(format!("Investigation stopped early: {}", e));
            outcome.terminal = TerminalState::Exhausted;
        }
    }
    info!(
        parameter = %outcome.candidate.name,
        terminal = %outcome.terminal,
        turns = outcome.transcript.turns().len(),
        "Exploitation finished"
    );
    outcome
}

async fn run_loop(ctx: &PipelineContext, outcome: &mut ExploitationOutcome) -> Result<TerminalState, ScanError> {
    let candidate = outcome.candidate.clone();
    let max = ctx.max_iterations.to_string();
    let system = ctx.render("system/injection-exploit", &[("MAX_ITERATIONS", max.clone())])?;
    let opening = ctx.render(
        "tasks/injection-exploit",
        &[
            ("PARAMETER", candidate.name.clone()),
            ("LOCATION", candidate.location.to_string()),
            ("METHOD", candidate.method.to_string()),
            ("ENDPOINT", candidate.endpoint.clone()),
            ("BASELINE_VALUE", candidate.original_value.clone()),
            ("DETECTION_REASON", outcome.detection_reason.clone()),
        ],
    )?;
    let mut messages = vec![Message::system(system), Message::user(opening)];
    let operation = format!("exploit:{}", candidate.name);

    for iteration in 1..=ctx.max_iterations {
        let (backend, reply) = ctx.converse(TaskDescriptor::exploitation(), &messages, &operation).await?;
        messages.push(Message::assistant(reply.clone()));

        let mut turn = TranscriptTurn {
            iteration,
            backend,
            reply: reply.clone(),
            payload: None,
            outcome: ProbeOutcome::NotSent,
            verdict: None,
            timestamp: Utc::now(),
        };

        match parse_directive(&reply) {
            Err(e) => {
                debug!(parameter = %candidate.name, iteration, error = %e, "Unusable directive");
                outcome.transcript.push(turn);
                messages.push(Message::user(format!(
                    "That reply could not be used ({}). Answer with exactly one JSON directive.",
                    e
                )));
            }
            Ok(Directive::Probe { payload }) => {
                turn.payload = Some(payload.clone());
                match ctx.probe(&candidate.request_with(&payload)).await {
                    Ok(result) => {
                        let step = ctx.render(
                            "tasks/injection-exploit-step",
                            &[
                                ("ITERATION", iteration.to_string()),
                                ("MAX_ITERATIONS", max.clone()),
                                ("PAYLOAD", payload),
                                ("STATUS", result.status.to_string()),
                                ("LENGTH", result.body.len().to_string()),
                                ("ELAPSED_MS", result.elapsed_ms.to_string()),
                                ("BODY", truncate_chars(&result.body, MAX_BODY_EXCERPT)),
                            ],
                        )?;
                        turn.outcome = ProbeOutcome::Response { result };
                        outcome.transcript.push(turn);
                        messages.push(Message::user(step));
                    }
                    Err(e) => {
                        turn.outcome = ProbeOutcome::Failed { error: truncate_error(&e.to_string()) };
                        outcome.transcript.push(turn);
                        outcome.transcript.note(format!("Probe failed on iteration {}: {}", iteration, e));
                        return Ok(TerminalState::Exhausted);
                    }
                }
            }
            Ok(Directive::Verdict { state, payload, summary, extracted }) => {
                if let Some(payload) = &payload {
                    if outcome.transcript.last_executed_payload() != Some(payload.as_str()) {
                        turn.outcome = match ctx.probe(&candidate.request_with(payload)).await {
                            Ok(result) => ProbeOutcome::Response { result },
                            Err(e) => {
                                outcome.transcript.note(format!("Confirmation probe failed: {}", e));
                                ProbeOutcome::Failed { error: truncate_error(&e.to_string()) }
                            }
                        };
                    }
                }
                turn.payload = payload;
                turn.verdict = Some(state);
                outcome.transcript.push(turn);
                outcome.summary = Some(summary).filter(|s| !s.is_empty());
                outcome.extracted = extracted;
                return Ok(state);
            }
        }
    }

    outcome.transcript.note(format!(
        "Iteration budget of {} exhausted without a verdict",
        ctx.max_iterations
    ));
    Ok(TerminalState::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe() {
        let d = parse_directive(r#"{"action": "probe", "payload": "1 OR 1=1", "reasoning": "boolean"}"#).unwrap();
        assert_eq!(d, Directive::Probe { payload: "1 OR 1=1".into() });
    }

    #[test]
    fn test_parse_payload_without_action_is_probe() {
        let d = parse_directive("Next: {\"payload\": \"1' --\"}").unwrap();
        assert_eq!(d, Directive::Probe { payload: "1' --".into() });
    }

    #[test]
    fn test_parse_verdicts() {
        let d = parse_directive(
            r#"{"action":"verdict","verdict":"exploited","payload":"1 UNION SELECT 1","summary":"tables","extracted":"users"}"#,
        )
        .unwrap();
        assert_eq!(
            d,
            Directive::Verdict {
                state: TerminalState::Exploited,
                payload: Some("1 UNION SELECT 1".into()),
                summary: "tables".into(),
                extracted: Some("users".into()),
            }
        );

        let blocked = parse_directive(r#"{"action":"verdict","verdict":"blocked","summary":"WAF"}"#).unwrap();
        assert!(matches!(blocked, Directive::Verdict { state: TerminalState::PotentialBlocked, payload: None, .. }));

        let fp = parse_directive(r#"{"action":"verdict","verdict":"false_positive"}"#).unwrap();
        assert!(matches!(fp, Directive::Verdict { state: TerminalState::FalsePositive, .. }));
    }

    #[test]
    fn test_parse_rejects_unusable_replies() {
        assert!(parse_directive("I will now try a UNION payload").is_err());
        assert!(parse_directive(r#"{"action":"probe"}"#).is_err());
        assert!(parse_directive(r#"{"action":"verdict","verdict":"maybe"}"#).is_err());
        assert!(parse_directive(r#"{"action":"dance","payload":"x"}"#).is_err());
    }
}
