//! Hybrid backend routing.
//!
//! Routing is a pure function of the task descriptor and the thresholds, so
//! one router can be shared by concurrent workers without locking.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{LlmConfig, RoutingConfig, Strategy};
use crate::errors::ScanError;
use super::factory::create_backend;
use super::provider::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Detection,
    Exploitation,
    Analysis,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    complexity: f64,
}

impl TaskDescriptor {
    /// Scores outside [0, 1] are clamped; NaN counts as 0.
    pub fn new(kind: TaskKind, complexity: f64) -> Self {
        let complexity = if complexity.is_nan() { 0.0 } else { complexity.clamp(0.0, 1.0) };
        Self { kind, complexity }
    }

    pub fn detection() -> Self {
        Self::new(TaskKind::Detection, 0.2)
    }

    pub fn exploitation() -> Self {
        Self::new(TaskKind::Exploitation, 0.9)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendTier {
    Inexpensive,
    Balanced,
    Capable,
}

impl BackendTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendTier::Inexpensive => "inexpensive",
            BackendTier::Balanced => "balanced",
            BackendTier::Capable => "capable",
        }
    }
}

impl std::fmt::Display for BackendTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingThresholds {
    pub simple: f64,
    pub complex: f64,
}

impl From<RoutingConfig> for RoutingThresholds {
    fn from(cfg: RoutingConfig) -> Self {
        Self { simple: cfg.simple_threshold, complex: cfg.complex_threshold }
    }
}

impl Default for RoutingThresholds {
    fn default() -> Self {
        RoutingConfig::default().into()
    }
}

/// Pick a tier for a task. Total over every descriptor and threshold pair.
pub fn route(task: &TaskDescriptor, thresholds: &RoutingThresholds, has_balanced: bool) -> BackendTier {
    match task.kind {
        TaskKind::Detection => BackendTier::Inexpensive,
        TaskKind::Exploitation => BackendTier::Capable,
        TaskKind::Analysis if task.complexity > thresholds.complex => BackendTier::Capable,
        TaskKind::Analysis if task.complexity > thresholds.simple => {
            if has_balanced {
                BackendTier::Balanced
            } else {
                BackendTier::Inexpensive
            }
        }
        TaskKind::Analysis => BackendTier::Inexpensive,
    }
}

/// The backend chosen for one task.
#[derive(Clone)]
pub struct BackendHandle {
    pub tier: BackendTier,
    pub backend: Arc<dyn Backend>,
}

impl BackendHandle {
    /// `tier:provider/model`, used in transcripts and logs.
    pub fn label(&self) -> String {
        format!("{}:{}/{}", self.tier, self.backend.provider_name(), self.backend.model_name())
    }
}

pub struct HybridRouter {
    inexpensive: Arc<dyn Backend>,
    balanced: Option<Arc<dyn Backend>>,
    capable: Arc<dyn Backend>,
    thresholds: RoutingThresholds,
}

impl HybridRouter {
    pub fn new(
        inexpensive: Arc<dyn Backend>,
        capable: Arc<dyn Backend>,
        balanced: Option<Arc<dyn Backend>>,
        thresholds: RoutingThresholds,
    ) -> Self {
        Self { inexpensive, balanced, capable, thresholds }
    }

    /// Every tier bound to the same backend.
    pub fn single(backend: Arc<dyn Backend>, thresholds: RoutingThresholds) -> Self {
        Self {
            inexpensive: backend.clone(),
            balanced: None,
            capable: backend,
            thresholds,
        }
    }

    /// Build the backends the configured strategy needs. Credentials for
    /// unused tiers are not required.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ScanError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let thresholds = RoutingThresholds::from(config.routing);

        let router = match config.strategy {
            Strategy::Inexpensive => Self::single(create_backend(&config.inexpensive, timeout)?, thresholds),
            Strategy::Capable => Self::single(create_backend(&config.capable, timeout)?, thresholds),
            Strategy::Hybrid => {
                let balanced = config
                    .balanced
                    .as_ref()
                    .map(|cfg| create_backend(cfg, timeout))
                    .transpose()?;
                Self::new(
                    create_backend(&config.inexpensive, timeout)?,
                    create_backend(&config.capable, timeout)?,
                    balanced,
                    thresholds,
                )
            }
        };

        info!(
            strategy = %config.strategy,
            inexpensive = %router.inexpensive.model_name(),
            capable = %router.capable.model_name(),
            balanced = router.balanced.is_some(),
            "Backend router ready"
        );
        Ok(router)
    }

    pub fn select(&self, task: &TaskDescriptor) -> BackendHandle {
        let tier = route(task, &self.thresholds, self.balanced.is_some());
        let backend = match tier {
            BackendTier::Inexpensive => self.inexpensive.clone(),
            BackendTier::Capable => self.capable.clone(),
            BackendTier::Balanced => self.balanced.clone().unwrap_or_else(|| self.inexpensive.clone()),
        };
        BackendHandle { tier, backend }
    }
}
