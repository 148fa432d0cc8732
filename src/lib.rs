pub mod audit;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod prompts;
pub mod reporting;
pub mod utils;
