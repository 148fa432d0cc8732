use serde::{Deserialize, Serialize};

use crate::probe::forms::{query_with, HtmlForm};
use crate::probe::{ProbeMethod, ProbeRequest};

/// Position of one pipeline run in the detect/exploit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    Init,
    Detecting,
    NoVulnerability,
    CandidatesFound,
    Exploiting,
    Finished,
}

impl PipelineStage {
    pub fn can_advance_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Init, Detecting)
                | (Detecting, NoVulnerability)
                | (Detecting, CandidatesFound)
                | (CandidatesFound, Exploiting)
                | (Exploiting, Finished)
        )
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Detecting => "detecting",
            Self::NoVulnerability => "no-vulnerability",
            Self::CandidatesFound => "candidates-found",
            Self::Exploiting => "exploiting",
            Self::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// How the exploitation loop for one parameter ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Exploited,
    PotentialBlocked,
    FalsePositive,
    /// Budget spent, probe failure, backend failure or cancellation.
    Exhausted,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exploited => "exploited",
            Self::PotentialBlocked => "potential_blocked",
            Self::FalsePositive => "false_positive",
            Self::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLocation {
    Query,
    FormBody,
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::FormBody => f.write_str("form body"),
        }
    }
}

/// One injection point: the parameter under test plus everything needed to
/// replay the original request with a different value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateParameter {
    pub name: String,
    pub location: ParameterLocation,
    /// Request URL without the query string (form action for forms).
    pub endpoint: String,
    pub method: ProbeMethod,
    pub original_value: String,
    /// Every pair of the original request, including this parameter.
    pub pairs: Vec<(String, String)>,
}

impl CandidateParameter {
    pub fn from_query(endpoint: &str, pairs: &[(String, String)], name: &str) -> Self {
        let original_value = pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        Self {
            name: name.to_string(),
            location: ParameterLocation::Query,
            endpoint: endpoint.to_string(),
            method: ProbeMethod::Get,
            original_value,
            pairs: pairs.to_vec(),
        }
    }

    pub fn from_form(form: &HtmlForm, name: &str) -> Self {
        let pairs: Vec<(String, String)> =
            form.fields.iter().map(|f| (f.name.clone(), f.value.clone())).collect();
        let original_value = pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let location = match form.method {
            ProbeMethod::Get => ParameterLocation::Query,
            ProbeMethod::Post => ParameterLocation::FormBody,
        };
        Self {
            name: name.to_string(),
            location,
            endpoint: form.action.clone(),
            method: form.method,
            original_value,
            pairs,
        }
    }

    /// A query parameter that was not present on the page.
    pub fn guessed(endpoint: &str, name: &str) -> Self {
        Self::from_query(endpoint, &[(name.to_string(), "1".to_string())], name)
    }

    /// The original request with this parameter's value replaced.
    pub fn request_with(&self, value: &str) -> ProbeRequest {
        match self.method {
            ProbeMethod::Get => query_with(&self.endpoint, &self.pairs, &self.name, value),
            ProbeMethod::Post => {
                let pairs = self
                    .pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), if *k == self.name { value.to_string() } else { v.clone() }))
                    .collect();
                ProbeRequest::post_form(self.endpoint.clone(), pairs)
            }
        }
    }

    /// Stable identity used for de-duplication and file names.
    pub fn key(&self) -> String {
        format!("{} {} {}", self.method, self.endpoint, self.name)
    }
}
