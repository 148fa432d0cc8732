use std::path::Path;

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::errors::ScanError;
use crate::pipeline::exploitation::ExploitationOutcome;

/// JSONL record of one parameter's exploitation conversation.
pub struct TranscriptLogger {
    file: tokio::fs::File,
}

impl TranscriptLogger {
    pub async fn new(base_dir: &Path, sequence: usize, parameter: &str) -> Result<Self, ScanError> {
        let safe: String = parameter
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let filename = format!("{:03}_{}.jsonl", sequence, safe);
        let path = base_dir.join("transcripts").join(&filename);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { file })
    }

    pub async fn log_event(&mut self, event_type: &str, data: &serde_json::Value) -> Result<(), ScanError> {
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event_type,
            "data": data,
        });
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// One `turn` line per transcript turn, then notes and the terminal state.
    pub async fn write_outcome(&mut self, outcome: &ExploitationOutcome) -> Result<(), ScanError> {
        self.log_event("candidate", &serde_json::to_value(&outcome.candidate)?).await?;
        for turn in outcome.transcript.turns() {
            self.log_event("turn", &serde_json::to_value(turn)?).await?;
        }
        for note in outcome.transcript.notes() {
            self.log_event("note", &serde_json::json!({ "text": note })).await?;
        }
        self.log_event(
            "terminal",
            &serde_json::json!({
                "state": outcome.terminal,
                "summary": outcome.summary,
                "extracted": outcome.extracted,
            }),
        )
        .await
    }
}
