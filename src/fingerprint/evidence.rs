use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::profile::Confidence;
use super::signatures::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Header,
    Cookie,
    Body,
    Path,
    Version,
    ErrorProbe,
}

impl SignalKind {
    /// A CMS body signature is direct page content and weighs double.
    pub fn weight(self, category: Category) -> usize {
        match (self, category) {
            (SignalKind::Body, Category::Cms) => 2,
            _ => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Header => "header",
            SignalKind::Cookie => "cookie",
            SignalKind::Body => "body",
            SignalKind::Path => "path",
            SignalKind::Version => "version",
            SignalKind::ErrorProbe => "error-probe",
        }
    }
}

/// One independent piece of evidence. Two signals are the same when both
/// kind and source agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub source: String,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.source)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Hypothesis {
    signals: BTreeSet<Signal>,
    /// Sum of signal weights.
    score: usize,
    /// Identified from the page content itself.
    content_match: bool,
    version: Option<String>,
    /// Every well-known path this technology owns came back missing.
    paths_missing: bool,
}

impl Hypothesis {
    fn insert(&mut self, category: Category, signal: Signal) -> bool {
        let weight = signal.kind.weight(category);
        if !self.signals.insert(signal) {
            return false;
        }
        self.score += weight;
        self.content_match |= weight > 1;
        true
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn has_version(&self) -> bool {
        self.version.is_some()
    }

    /// Banded by weighted signal count, then one level lower when all owned
    /// paths were missing. Never below low while any signal exists, and
    /// never below medium for a page-content match.
    pub fn confidence(&self) -> Option<Confidence> {
        let base = Confidence::from_signal_count(self.score)?;
        if !self.paths_missing {
            return Some(base);
        }
        let demoted = base.demoted();
        Some(if self.content_match { demoted.max(base.min(Confidence::Medium)) } else { demoted })
    }
}

/// Evidence accumulated during one fingerprint pass, keyed by
/// (category, technology).
#[derive(Debug, Clone, Default)]
pub struct EvidenceLedger {
    entries: BTreeMap<(Category, &'static str), Hypothesis>,
}

impl EvidenceLedger {
    /// Record a signal. Returns false when the same signal was already present.
    pub fn add(&mut self, category: Category, tech: &'static str, kind: SignalKind, source: impl Into<String>) -> bool {
        self.entries
            .entry((category, tech))
            .or_default()
            .insert(category, Signal { kind, source: source.into() })
    }

    /// Record an explicit version string; counts as a Version signal.
    pub fn set_version(&mut self, category: Category, tech: &'static str, version: String) {
        let entry = self.entries.entry((category, tech)).or_default();
        entry.insert(category, Signal { kind: SignalKind::Version, source: version.clone() });
        entry.version.get_or_insert(version);
    }

    /// Mark that every owned path was missing. Only existing hypotheses are touched.
    pub fn mark_paths_missing(&mut self, category: Category, tech: &'static str) {
        if let Some(entry) = self.entries.get_mut(&(category, tech)) {
            entry.paths_missing = true;
        }
    }

    pub fn contains(&self, category: Category, tech: &'static str) -> bool {
        self.entries.contains_key(&(category, tech))
    }

    pub fn get(&self, category: Category, tech: &str) -> Option<&Hypothesis> {
        self.entries
            .iter()
            .find(|((c, t), _)| *c == category && *t == tech)
            .map(|(_, h)| h)
    }

    pub fn confidence(&self, category: Category, tech: &str) -> Option<Confidence> {
        self.get(category, tech).and_then(Hypothesis::confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_bands() {
        let mut ledger = EvidenceLedger::default();
        assert_eq!(ledger.confidence(Category::Cms, "WordPress"), None);
        ledger.add(Category::Cms, "WordPress", SignalKind::Cookie, "wordpress_*");
        assert_eq!(ledger.confidence(Category::Cms, "WordPress"), Some(Confidence::Low));
        ledger.add(Category::Cms, "WordPress", SignalKind::Path, "/wp-login.php");
        assert_eq!(ledger.confidence(Category::Cms, "WordPress"), Some(Confidence::Medium));
        ledger.add(Category::Cms, "WordPress", SignalKind::Header, "x-pingback");
        assert_eq!(ledger.confidence(Category::Cms, "WordPress"), Some(Confidence::High));
    }

    #[test]
    fn test_cms_body_signature_weighs_double() {
        let mut ledger = EvidenceLedger::default();
        ledger.add(Category::Cms, "WordPress", SignalKind::Body, "wp-content");
        ledger.add(Category::Database, "mysql", SignalKind::Body, "SQL syntax.*MySQL");
        let wp = ledger.get(Category::Cms, "WordPress").unwrap();
        assert_eq!((wp.signals().count(), wp.score()), (1, 2));
        assert_eq!(ledger.confidence(Category::Cms, "WordPress"), Some(Confidence::Medium));
        assert_eq!(ledger.confidence(Category::Database, "mysql"), Some(Confidence::Low));
    }

    #[test]
    fn test_missing_paths_keep_content_match_at_medium() {
        let mut ledger = EvidenceLedger::default();
        ledger.add(Category::Cms, "WordPress", SignalKind::Body, "wp-content");
        ledger.mark_paths_missing(Category::Cms, "WordPress");
        assert_eq!(ledger.confidence(Category::Cms, "WordPress"), Some(Confidence::Medium));
    }

    #[test]
    fn test_duplicate_signal_not_counted() {
        let mut ledger = EvidenceLedger::default();
        assert!(ledger.add(Category::Database, "mysql", SignalKind::ErrorProbe, "SQL syntax.*MySQL"));
        assert!(!ledger.add(Category::Database, "mysql", SignalKind::ErrorProbe, "SQL syntax.*MySQL"));
        assert_eq!(ledger.get(Category::Database, "mysql").unwrap().score(), 1);
    }

    #[test]
    fn test_confidence_monotonic_in_signals() {
        let kinds = [
            SignalKind::Header,
            SignalKind::Cookie,
            SignalKind::Body,
            SignalKind::Path,
            SignalKind::Version,
            SignalKind::ErrorProbe,
        ];
        for demote in [false, true] {
            let mut ledger = EvidenceLedger::default();
            let mut previous = None;
            for (i, kind) in kinds.iter().enumerate() {
                ledger.add(Category::Waf, "cloudflare", *kind, format!("source-{i}"));
                if demote {
                    ledger.mark_paths_missing(Category::Waf, "cloudflare");
                }
                let current = ledger.confidence(Category::Waf, "cloudflare");
                assert!(current >= previous, "confidence dropped after {:?}", kind);
                previous = current;
            }
        }
    }

    #[test]
    fn test_missing_paths_demote_only_that_hypothesis() {
        let mut ledger = EvidenceLedger::default();
        ledger.add(Category::Cms, "Joomla", SignalKind::Body, "/media/jui/");
        ledger.add(Category::Cms, "Joomla", SignalKind::Body, "/components/com_");
        ledger.add(Category::Server, "nginx", SignalKind::Header, "server");
        ledger.add(Category::Server, "nginx", SignalKind::Version, "1.18.0");
        ledger.mark_paths_missing(Category::Cms, "Joomla");
        assert_eq!(ledger.confidence(Category::Cms, "Joomla"), Some(Confidence::Medium));
        assert_eq!(ledger.confidence(Category::Server, "nginx"), Some(Confidence::Medium));
    }

    #[test]
    fn test_demotion_never_below_low() {
        let mut ledger = EvidenceLedger::default();
        ledger.add(Category::Cms, "Magento", SignalKind::Cookie, "frontend");
        ledger.mark_paths_missing(Category::Cms, "Magento");
        assert_eq!(ledger.confidence(Category::Cms, "Magento"), Some(Confidence::Low));
    }

    #[test]
    fn test_mark_missing_does_not_create_hypothesis() {
        let mut ledger = EvidenceLedger::default();
        ledger.mark_paths_missing(Category::Cms, "Drupal");
        assert!(!ledger.contains(Category::Cms, "Drupal"));
    }
}
