use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Weighted signal count: 1 is low, 2 medium, 3 or more high.
    pub fn from_signal_count(count: usize) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(Confidence::Low),
            2 => Some(Confidence::Medium),
            _ => Some(Confidence::High),
        }
    }

    pub fn demoted(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: Option<String>,
    pub confidence: Confidence,
}

impl std::fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}/{}", self.name, v),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub language: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmsInfo {
    pub name: String,
    pub version: Option<String>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkMatch {
    pub name: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frameworks {
    /// Strongest first.
    pub backend: Vec<FrameworkMatch>,
    pub frontend: BTreeSet<String>,
}

impl Frameworks {
    pub fn is_empty(&self) -> bool {
        self.backend.is_empty() && self.frontend.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    #[serde(rename = "type")]
    pub db_type: String,
    pub confidence: Confidence,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WafInfo {
    pub detected: bool,
    #[serde(rename = "type")]
    pub waf_type: String,
    pub confidence: Confidence,
}

/// Snapshot of everything inferred about one target. Built once per analysis
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyProfile {
    pub url: String,
    pub final_url: Option<String>,
    pub status: Option<u16>,
    pub server: Option<ServerInfo>,
    pub backend: Option<BackendInfo>,
    pub cms: Option<CmsInfo>,
    pub frameworks: Frameworks,
    pub database: Option<DatabaseInfo>,
    pub waf: Option<WafInfo>,
    pub overall_confidence: Confidence,
    pub paths_found: Vec<String>,
    pub technologies: Vec<String>,
    pub summary: String,
    /// Reasons some sections could not be fully evaluated.
    pub degraded: Vec<String>,
}

impl TechnologyProfile {
    /// Profile for a target that never answered.
    pub fn unreachable(url: &str, degraded: Vec<String>) -> Self {
        Self {
            url: url.to_string(),
            final_url: None,
            status: None,
            server: None,
            backend: None,
            cms: None,
            frameworks: Frameworks::default(),
            database: None,
            waf: None,
            overall_confidence: Confidence::Low,
            paths_found: Vec::new(),
            technologies: Vec::new(),
            summary: "Unknown Stack".to_string(),
            degraded,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.status.is_some()
    }

    /// Database type for prompt context, e.g. `mysql`.
    pub fn database_dialect(&self) -> Option<&str> {
        self.database.as_ref().map(|d| d.db_type.as_str())
    }

    pub fn waf_detected(&self) -> bool {
        self.waf.as_ref().is_some_and(|w| w.detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
        assert_eq!(Confidence::High.demoted(), Confidence::Medium);
        assert_eq!(Confidence::Low.demoted(), Confidence::Low);
    }

    #[test]
    fn test_confidence_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Confidence::Medium).unwrap(), "\"medium\"");
    }

    #[test]
    fn test_unreachable_profile_is_empty() {
        let p = TechnologyProfile::unreachable("http://10.0.0.1", vec!["baseline request failed".into()]);
        assert_eq!(p.overall_confidence, Confidence::Low);
        assert!(p.server.is_none() && p.cms.is_none() && p.database.is_none() && p.waf.is_none());
        assert!(p.frameworks.is_empty());
        assert!(!p.is_reachable());
    }

    #[test]
    fn test_server_display() {
        let s = ServerInfo { name: "nginx".into(), version: Some("1.18.0".into()), confidence: Confidence::Medium };
        assert_eq!(s.to_string(), "nginx/1.18.0");
    }
}
