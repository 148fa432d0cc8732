pub mod classifier;
pub mod context;
pub mod detection;
pub mod exploitation;
pub mod injection;
pub mod orchestrator;
pub mod state;
pub mod transcript;

pub use classifier::classify;
pub use context::PipelineContext;
pub use injection::{InjectionPipeline, PipelineRun};
pub use orchestrator::ScanOrchestrator;
pub use state::{CandidateParameter, PipelineStage, TerminalState};
pub use transcript::ExploitationTranscript;
