use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::probe::forms::{extract_forms, origin, query_with, split_query};
use crate::probe::{ProbeClient, ProbeRequest, ProbeResult};
use super::evidence::{EvidenceLedger, SignalKind};
use super::profile::{
    BackendInfo, CmsInfo, Confidence, DatabaseInfo, FrameworkMatch, Frameworks, ServerInfo,
    TechnologyProfile, WafInfo,
};
use super::signatures::{Category, Signature, ERROR_PROBE_VALUES, GENERIC_PATHS, SIGNATURES};

/// Outcome of one well-known path probe. `status` is `None` when the request failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathObservation {
    pub path: String,
    pub status: Option<u16>,
}

impl PathObservation {
    fn present(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s) || s == 401 || s == 403)
    }

    fn missing(&self) -> bool {
        matches!(self.status, Some(404) | Some(410))
    }
}

/// Raw responses gathered for one target. Profile construction is a pure
/// function of this value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observations {
    pub target: String,
    pub baseline: Option<ProbeResult>,
    pub canary: Option<ProbeResult>,
    pub error_probes: Vec<ProbeResult>,
    pub paths: Vec<PathObservation>,
    pub notes: Vec<String>,
}

pub struct FingerprintEngine {
    client: ProbeClient,
}

impl FingerprintEngine {
    pub fn new(client: ProbeClient) -> Self {
        Self { client }
    }

    /// Run the probe battery and score the result. Never fails: problems are
    /// recorded as degradation notes on the profile.
    pub async fn analyze(&self, target: &str) -> TechnologyProfile {
        info!(target = %target, "Starting fingerprint");
        let observations = self.observe(target).await;
        let profile = build_profile(&observations);
        info!(
            target = %target,
            summary = %profile.summary,
            confidence = %profile.overall_confidence,
            "Fingerprint complete"
        );
        profile
    }

    pub async fn observe(&self, target: &str) -> Observations {
        let mut obs = Observations { target: target.to_string(), ..Default::default() };

        let baseline = match self.client.probe(&ProbeRequest::get(target)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(target = %target, error = %e, "Baseline request failed");
                obs.notes.push(format!("Failed to reach target: {}", e));
                return obs;
            }
        };
        debug!(status = baseline.status, "Baseline received");

        obs.error_probes = self.error_probes(target, &baseline, &mut obs.notes).await;

        match origin(target) {
            Some(base) => {
                let canary_path = format!("/{}-bs-canary", uuid::Uuid::new_v4().simple());
                match self.client.probe(&ProbeRequest::get(format!("{base}{canary_path}"))).await {
                    Ok(canary) if canary.is_success() => {
                        obs.notes.push(format!(
                            "Path probing skipped: unknown path {} answered {} (soft 404)",
                            canary_path, canary.status
                        ));
                        obs.canary = Some(canary);
                    }
                    Ok(canary) => {
                        obs.canary = Some(canary);
                        obs.paths = self.probe_paths(&base).await;
                    }
                    Err(e) => obs.notes.push(format!("Path probing skipped: {}", e)),
                }
            }
            None => obs.notes.push("Path probing skipped: target has no origin".into()),
        }

        obs.baseline = Some(baseline);
        obs
    }

    async fn error_probes(&self, target: &str, baseline: &ProbeResult, notes: &mut Vec<String>) -> Vec<ProbeResult> {
        let (endpoint, pairs) = split_query(target);
        let requests: Vec<ProbeRequest> = if let Some((name, value)) = pairs.first() {
            ERROR_PROBE_VALUES
                .iter()
                .map(|bad| query_with(&endpoint, &pairs, name, &format!("{value}{bad}")))
                .collect()
        } else if let Some((form, field)) = extract_forms(&baseline.body, target)
            .into_iter()
            .find_map(|f| f.fields.iter().find(|fld| !fld.hidden).cloned().map(|fld| (f, fld)))
        {
            ERROR_PROBE_VALUES
                .iter()
                .map(|bad| form.submit_with(&field.name, &format!("{}{bad}", field.value)))
                .collect()
        } else {
            debug!("No parameter available for database error probes");
            return Vec::new();
        };

        let mut results = Vec::new();
        for request in &requests {
            match self.client.probe(request).await {
                Ok(result) => results.push(result),
                Err(e) => notes.push(format!("Database error probe failed: {}", e)),
            }
        }
        results
    }

    async fn probe_paths(&self, base: &str) -> Vec<PathObservation> {
        let mut out = Vec::new();
        for path in well_known_paths() {
            let status = match self.client.probe(&ProbeRequest::get(format!("{base}{path}"))).await {
                Ok(result) => Some(result.status),
                Err(e) => {
                    debug!(path, error = %e, "Path probe failed");
                    None
                }
            };
            out.push(PathObservation { path: path.to_string(), status });
        }
        out
    }
}

/// Signature-owned paths followed by generic ones, deduplicated in table order.
pub fn well_known_paths() -> Vec<&'static str> {
    let mut paths: Vec<&'static str> = Vec::new();
    for path in SIGNATURES.iter().flat_map(|s| s.paths.iter().copied()).chain(GENERIC_PATHS.iter().copied()) {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

fn collect_baseline(ledger: &mut EvidenceLedger, sig: &'static Signature, baseline: &ProbeResult) {
    for matcher in &sig.headers {
        if let Some(source) = matcher.find(baseline) {
            ledger.add(sig.category, sig.name, SignalKind::Header, source);
        }
    }
    for cookie in baseline.set_cookie_names() {
        if let Some(pattern) = sig.cookie_matches(&cookie) {
            ledger.add(sig.category, sig.name, SignalKind::Cookie, pattern);
        }
    }
    for re in &sig.body {
        if re.is_match(&baseline.body) {
            ledger.add(sig.category, sig.name, SignalKind::Body, re.as_str());
        }
    }
    // Error text already on the page counts as body evidence.
    for re in &sig.errors {
        if re.is_match(&baseline.body) {
            ledger.add(sig.category, sig.name, SignalKind::Body, re.as_str());
        }
    }
    // A version string only means something alongside a positive match.
    if ledger.contains(sig.category, sig.name) {
        if let Some(version) = sig.extract_version(baseline) {
            ledger.set_version(sig.category, sig.name, version);
        }
    }
}

fn collect_paths(ledger: &mut EvidenceLedger, sig: &'static Signature, paths: &[PathObservation]) {
    if sig.paths.is_empty() || !ledger.contains(sig.category, sig.name) {
        return;
    }
    let owned: Vec<&PathObservation> = paths
        .iter()
        .filter(|p| sig.paths.contains(&p.path.as_str()))
        .collect();
    for obs in &owned {
        if obs.present() {
            ledger.add(sig.category, sig.name, SignalKind::Path, obs.path.clone());
        }
    }
    if owned.len() == sig.paths.len() && owned.iter().all(|p| p.missing()) {
        ledger.mark_paths_missing(sig.category, sig.name);
    }
}

/// Strongest hypothesis in a category: highest weighted score, then an
/// explicit version, then table order.
fn resolve(ledger: &EvidenceLedger, category: Category) -> Vec<(&'static str, Confidence, Option<String>)> {
    let mut ranked: Vec<(usize, &'static str, Confidence, Option<String>, usize, bool)> = SIGNATURES
        .iter()
        .enumerate()
        .filter(|(_, s)| s.category == category)
        .filter_map(|(idx, s)| {
            let h = ledger.get(category, s.name)?;
            let confidence = h.confidence()?;
            Some((idx, s.name, confidence, h.version().map(str::to_string), h.score(), h.has_version()))
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.4.cmp(&a.4)
            .then_with(|| b.5.cmp(&a.5))
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
        .into_iter()
        .map(|(_, name, confidence, version, _, _)| (name, confidence, version))
        .collect()
}

/// Score gathered observations. Deterministic: identical observations give
/// identical profiles.
pub fn build_profile(obs: &Observations) -> TechnologyProfile {
    let mut degraded = obs.notes.clone();
    let Some(baseline) = &obs.baseline else {
        if degraded.is_empty() {
            degraded.push("Failed to reach target".to_string());
        }
        return TechnologyProfile::unreachable(&obs.target, degraded);
    };

    let mut ledger = EvidenceLedger::default();
    for sig in SIGNATURES.iter() {
        collect_baseline(&mut ledger, sig, baseline);
        for probe in &obs.error_probes {
            for re in &sig.errors {
                if re.is_match(&probe.body) {
                    ledger.add(sig.category, sig.name, SignalKind::ErrorProbe, re.as_str());
                }
            }
        }
    }
    for sig in SIGNATURES.iter() {
        collect_paths(&mut ledger, sig, &obs.paths);
    }

    let first = |category| resolve(&ledger, category).into_iter().next();

    let server = first(Category::Server)
        .map(|(name, confidence, version)| ServerInfo { name: name.to_string(), version, confidence })
        .or_else(|| {
            // Unrecognised banner: keep it verbatim.
            baseline.header("server").filter(|s| !s.trim().is_empty()).map(|raw| ServerInfo {
                name: raw.trim().to_string(),
                version: None,
                confidence: Confidence::Low,
            })
        });

    let backend = first(Category::Language)
        .map(|(language, _, version)| BackendInfo { language: language.to_string(), version });

    let cms = first(Category::Cms)
        .map(|(name, confidence, version)| CmsInfo { name: name.to_string(), version, confidence });

    let frameworks = Frameworks {
        backend: resolve(&ledger, Category::BackendFramework)
            .into_iter()
            .map(|(name, confidence, _)| FrameworkMatch { name: name.to_string(), confidence })
            .collect(),
        frontend: resolve(&ledger, Category::FrontendLibrary)
            .into_iter()
            .map(|(name, _, _)| name.to_string())
            .collect(),
    };

    let database = first(Category::Database).map(|(db_type, confidence, _)| DatabaseInfo {
        evidence: ledger
            .get(Category::Database, db_type)
            .map(|h| h.signals().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
        db_type: db_type.to_string(),
        confidence,
    });

    let waf = first(Category::Waf).map(|(name, confidence, _)| WafInfo {
        detected: true,
        waf_type: name.to_string(),
        confidence,
    });

    let mut paths_found: Vec<String> = obs.paths.iter().filter(|p| p.present()).map(|p| p.path.clone()).collect();
    paths_found.dedup();

    let overall_confidence = overall_confidence(
        server.is_some(),
        backend.is_some(),
        cms.as_ref().map(|c| c.confidence),
        database.as_ref().map(|d| d.confidence),
        !frameworks.is_empty(),
    );

    let mut profile = TechnologyProfile {
        url: obs.target.clone(),
        final_url: Some(baseline.final_url.clone()).filter(|u| !u.is_empty()),
        status: Some(baseline.status),
        server,
        backend,
        cms,
        frameworks,
        database,
        waf,
        overall_confidence,
        paths_found,
        technologies: Vec::new(),
        summary: String::new(),
        degraded,
    };
    profile.technologies = technology_list(&profile);
    profile.summary = summary(&profile);
    profile
}

/// Server +1, backend language +2, CMS at medium or better +2, database at
/// medium or better +2, any framework +1. 6+ is high, 3+ medium.
fn overall_confidence(
    server: bool,
    language: bool,
    cms: Option<Confidence>,
    database: Option<Confidence>,
    any_framework: bool,
) -> Confidence {
    let strong = |c: Option<Confidence>| c.is_some_and(|c| c >= Confidence::Medium);
    let score = usize::from(server)
        + 2 * usize::from(language)
        + 2 * usize::from(strong(cms))
        + 2 * usize::from(strong(database))
        + usize::from(any_framework);
    match score {
        s if s >= 6 => Confidence::High,
        s if s >= 3 => Confidence::Medium,
        _ => Confidence::Low,
    }
}

fn technology_list(profile: &TechnologyProfile) -> Vec<String> {
    let mut techs = Vec::new();
    if let Some(server) = &profile.server {
        techs.push(server.to_string());
    }
    if let Some(backend) = &profile.backend {
        techs.push(match &backend.version {
            Some(v) => format!("{} {}", backend.language, v),
            None => backend.language.clone(),
        });
    }
    if let Some(cms) = &profile.cms {
        techs.push(match &cms.version {
            Some(v) => format!("{} {}", cms.name, v),
            None => cms.name.clone(),
        });
    }
    techs.extend(profile.frameworks.backend.iter().map(|f| f.name.clone()));
    techs.extend(profile.frameworks.frontend.iter().cloned());
    if let Some(db) = &profile.database {
        techs.push(db.db_type.clone());
    }
    if let Some(waf) = &profile.waf {
        techs.push(format!("WAF: {}", waf.waf_type));
    }
    techs
}

fn summary(profile: &TechnologyProfile) -> String {
    let mut parts = Vec::new();
    if let Some(server) = &profile.server {
        parts.push(server.name.clone());
    }
    if let Some(backend) = &profile.backend {
        parts.push(backend.language.clone());
    }
    if let Some(cms) = &profile.cms {
        parts.push(cms.name.clone());
    } else if let Some(framework) = profile.frameworks.backend.first() {
        parts.push(framework.name.clone());
    }
    if let Some(db) = &profile.database {
        parts.push(format!("DB:{}", db.db_type));
    }
    if let Some(waf) = &profile.waf {
        parts.push(format!("WAF:{}", waf.waf_type));
    }
    if parts.is_empty() {
        "Unknown Stack".to_string()
    } else {
        parts.join(" | ")
    }
}
