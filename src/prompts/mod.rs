pub mod loader;

pub use loader::{interpolate, PromptLoader, PromptVariables};
