pub mod finding;
pub mod report;

pub use finding::*;
pub use report::{FindingCounts, ScanReport};
