pub mod client;
pub mod forms;
pub mod identity;
pub mod request;
pub mod result;

pub use client::{ProbeClient, ProbeStats};
pub use request::{ProbeMethod, ProbeRequest};
pub use result::ProbeResult;
