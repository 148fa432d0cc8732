//! The injection testing pipeline: Init → Detecting → {NoVulnerability |
//! CandidatesFound} → Exploiting → Finished.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::classifier::classify_outcome;
use super::context::PipelineContext;
use super::detection::{detect, DetectionResult};
use super::exploitation::{exploit, ExploitationOutcome};
use super::state::{PipelineStage, TerminalState};
use super::transcript::ExploitationTranscript;
use crate::models::Finding;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub stage: PipelineStage,
    pub detections: Vec<DetectionResult>,
    pub outcomes: Vec<ExploitationOutcome>,
}

impl PipelineRun {
    pub fn flagged(&self) -> usize {
        self.detections.iter().filter(|d| d.flagged()).count()
    }

    /// Classified findings in parameter order, false positives included.
    pub fn findings(&self, target: &str) -> Vec<Finding> {
        self.outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| classify_outcome(target, outcome, i + 1))
            .collect()
    }

    /// Detection errors for the degraded-sections list.
    pub fn detection_errors(&self) -> Vec<String> {
        self.detections
            .iter()
            .filter_map(|d| d.error.as_ref().map(|e| format!("{}: {}", d.candidate.name, e)))
            .collect()
    }
}

pub struct InjectionPipeline {
    ctx: PipelineContext,
    parallel: bool,
    max_concurrency: usize,
    stage: PipelineStage,
}

impl InjectionPipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx, parallel: false, max_concurrency: 1, stage: PipelineStage::Init }
    }

    /// Exploit flagged parameters concurrently, each on its own session.
    pub fn parallel(mut self, max_concurrency: usize) -> Self {
        self.parallel = true;
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    fn advance(&mut self, next: PipelineStage) {
        debug_assert!(self.stage.can_advance_to(next), "{} -> {}", self.stage, next);
        info!(from = %self.stage, to = %next, "Pipeline stage");
        self.stage = next;
    }

    pub async fn run(mut self) -> PipelineRun {
        self.advance(PipelineStage::Detecting);
        let detections = detect(&self.ctx).await;

        let flagged: Vec<DetectionResult> = detections.iter().filter(|d| d.flagged()).cloned().collect();
        if flagged.is_empty() {
            self.advance(PipelineStage::NoVulnerability);
            return PipelineRun { stage: self.stage, detections, outcomes: Vec::new() };
        }

        self.advance(PipelineStage::CandidatesFound);
        self.advance(PipelineStage::Exploiting);
        let outcomes = if self.parallel {
            self.exploit_parallel(flagged).await
        } else {
            let mut outcomes = Vec::with_capacity(flagged.len());
            for detection in &flagged {
                outcomes.push(exploit(&self.ctx, detection).await);
            }
            outcomes
        };

        self.advance(PipelineStage::Finished);
        PipelineRun { stage: self.stage, detections, outcomes }
    }

    async fn exploit_parallel(&self, flagged: Vec<DetectionResult>) -> Vec<ExploitationOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let handles: Vec<_> = flagged
            .iter()
            .cloned()
            .map(|detection| {
                let semaphore = semaphore.clone();
                let ctx = self.ctx.forked();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    match ctx {
                        Ok(ctx) => exploit(&ctx, &detection).await,
                        Err(e) => {
                            warn!(parameter = %detection.candidate.name, error = %e, "Could not open a worker session");
                            unstarted(detection, format!("Worker session could not be created: {}", e))
                        }
                    }
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        results
            .into_iter()
            .zip(flagged)
            .map(|(result, detection)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(parameter = %detection.candidate.name, error = %e, "Exploitation task panicked");
                    unstarted(detection, format!("Exploitation task failed: {}", e))
                }
            })
            .collect()
    }
}

fn unstarted(detection: DetectionResult, note: String) -> ExploitationOutcome {
    let mut transcript = ExploitationTranscript::new(detection.candidate.name.clone());
    transcript.note(note);
    ExploitationOutcome {
        detection_reason: detection.verdict.map(|v| v.reason).unwrap_or_default(),
        candidate: detection.candidate,
        terminal: TerminalState::Exhausted,
        transcript,
        summary: None,
        extracted: None,
    }
}
