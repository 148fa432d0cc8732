use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::TerminalState;
use crate::probe::ProbeResult;
use crate::utils::truncation::truncate_chars;

/// What happened on the wire for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Response { result: ProbeResult },
    Failed { error: String },
    /// No request was sent (unparseable reply, or a verdict without a new payload).
    NotSent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub iteration: u32,
    /// Router label of the backend that produced `reply`.
    pub backend: String,
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub outcome: ProbeOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<TerminalState>,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptTurn {
    pub fn response(&self) -> Option<&ProbeResult> {
        match &self.outcome {
            ProbeOutcome::Response { result } => Some(result),
            _ => None,
        }
    }
}

/// Append-only record of one parameter's exploitation conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExploitationTranscript {
    pub parameter: String,
    turns: Vec<TranscriptTurn>,
    notes: Vec<String>,
}

impl ExploitationTranscript {
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            turns: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn push(&mut self, turn: TranscriptTurn) {
        self.turns.push(turn);
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Payload of the most recent turn that actually reached the target.
    pub fn last_executed_payload(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| !matches!(t.outcome, ProbeOutcome::NotSent))
            .and_then(|t| t.payload.as_deref())
    }

    /// Last payload that got a response from the target, with that response.
    pub fn last_successful_exchange(&self) -> Option<(&str, &ProbeResult)> {
        self.turns.iter().rev().find_map(|t| {
            let payload = t.payload.as_deref()?;
            t.response().map(|r| (payload, r))
        })
    }

    /// Human-readable digest of the last `max_turns` turns.
    pub fn excerpt(&self, max_turns: usize, body_chars: usize) -> String {
        let skip = self.turns.len().saturating_sub(max_turns);
        let mut lines = Vec::new();
        for turn in self.turns.iter().skip(skip) {
            let payload = turn.payload.as_deref().unwrap_or("-");
            let line = match &turn.outcome {
                ProbeOutcome::Response { result } => format!(
                    "[{}] payload `{}` -> HTTP {}, {} bytes, {} ms\n{}",
                    turn.iteration,
                    payload,
                    result.status,
                    result.body.len(),
                    result.elapsed_ms,
                    truncate_chars(result.body.trim(), body_chars)
                ),
                ProbeOutcome::Failed { error } => {
                    format!("[{}] payload `{}` -> request failed: {}", turn.iteration, payload, error)
                }
                ProbeOutcome::NotSent => {
                    format!("[{}] {}", turn.iteration, truncate_chars(turn.reply.trim(), body_chars))
                }
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}
