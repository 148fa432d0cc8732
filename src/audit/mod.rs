pub mod session;
pub mod transcript_logger;
pub mod utils;
pub mod workflow_logger;

pub use session::AuditSession;
