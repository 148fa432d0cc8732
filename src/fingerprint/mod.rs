pub mod engine;
pub mod evidence;
pub mod profile;
pub mod signatures;

pub use engine::{build_profile, FingerprintEngine, Observations};
pub use profile::{Confidence, TechnologyProfile};
