pub mod provider;
pub mod anthropic;
pub mod openai;
pub mod factory;
pub mod router;
pub mod types;
pub mod catalog;
pub mod usage;

pub use provider::{extract_json, Backend};
pub use factory::create_backend;
pub use router::{BackendHandle, BackendTier, HybridRouter, RoutingThresholds, TaskDescriptor, TaskKind};
pub use types::{Message, Role};
pub use usage::{UsageSummary, UsageTracker};
