pub mod assembler;
pub mod formatter;
pub mod metadata;

pub use assembler::{write_report, ReportPaths};
