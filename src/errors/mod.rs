pub mod types;
pub mod classification;
pub mod retry;

pub use types::ScanError;
pub use classification::{ErrorCategory, ErrorClassification};
pub use retry::{RetryPolicy, with_retry};
