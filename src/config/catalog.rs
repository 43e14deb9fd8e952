//! Workflow catalog: the automations the orchestrator starts with.
//!
//! Loaded from TOML. One `[policy]` table configures retries and success-rate
//! tracking; each `[[workflow]]` entry defines one automation.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::backoff::RetryPolicy;
use crate::error::{Error, Result};
use crate::model::workflow::{MAX_CADENCE_SECS, Status};

const BUILTIN: &str = include_str!("../../workflows.toml");

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    policy: PolicyConfig,
    #[serde(default, rename = "workflow")]
    workflows: Vec<WorkflowDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Fixed,
    Exponential,
}

/// Retry and success-rate settings shared by all workflows.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub strategy: Strategy,
    pub base_secs: u64,
    pub max_secs: u64,
    pub multiplier: f64,
    /// Weight of the newest outcome in the rolling success rate, (0, 1].
    pub smoothing: f64,
    /// Success rate below which a workflow needs attention.
    pub attention_threshold: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Exponential,
            base_secs: 15 * 60,
            max_secs: 4 * 60 * 60,
            multiplier: 2.0,
            smoothing: 0.2,
            attention_threshold: 50.0,
        }
    }
}

impl PolicyConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.strategy {
            Strategy::Fixed => RetryPolicy::Fixed {
                delay: Duration::from_secs(self.base_secs),
            },
            Strategy::Exponential => RetryPolicy::Exponential {
                base: Duration::from_secs(self.base_secs),
                max: Duration::from_secs(self.max_secs),
                multiplier: self.multiplier,
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.base_secs == 0 {
            return Err(Error::Config("policy.base_secs must be positive".to_string()));
        }
        if self.base_secs > MAX_CADENCE_SECS || self.max_secs > MAX_CADENCE_SECS {
            return Err(Error::Config("policy delays must not exceed one year".to_string()));
        }
        if self.strategy == Strategy::Exponential {
            if self.max_secs < self.base_secs {
                return Err(Error::Config(
                    "policy.max_secs must be at least policy.base_secs".to_string(),
                ));
            }
            if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
                return Err(Error::Config("policy.multiplier must be >= 1".to_string()));
            }
        }
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(Error::Config("policy.smoothing must be in (0, 1]".to_string()));
        }
        if !(0.0..=100.0).contains(&self.attention_threshold) {
            return Err(Error::Config(
                "policy.attention_threshold must be in [0, 100]".to_string(),
            ));
        }
        Ok(())
    }
}

/// One automation as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDef {
    pub id: String,
    pub name: String,
    pub source: String,
    pub cadence_secs: u64,
    /// Delay before the first trigger. Defaults to the cadence.
    pub first_trigger_secs: Option<u64>,
    #[serde(default = "default_status")]
    pub status: Status,
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    pub recommendation: Option<String>,
    /// Hook executed for each attempt.
    pub command: Option<PathBuf>,
}

fn default_status() -> Status {
    Status::Queued
}

fn default_success_rate() -> f64 {
    100.0
}

impl WorkflowDef {
    fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(Error::Config(format!("workflow '{}': {msg}", self.id)));
        if self.id.trim().is_empty() {
            return Err(Error::Config("workflow id must not be empty".to_string()));
        }
        if self.name.trim().is_empty() {
            return bad("name must not be empty");
        }
        if self.source.trim().is_empty() {
            return bad("source must not be empty");
        }
        if self.cadence_secs == 0 || self.cadence_secs > MAX_CADENCE_SECS {
            return bad("cadence_secs must be between 1 second and one year");
        }
        if self.first_trigger_secs.is_some_and(|s| s > MAX_CADENCE_SECS) {
            return bad("first_trigger_secs must not exceed one year");
        }
        if self.status == Status::Failed {
            return bad("a workflow cannot start in the failed state");
        }
        if !(0.0..=100.0).contains(&self.success_rate) {
            return bad("success_rate must be in [0, 100]");
        }
        Ok(())
    }
}

/// Validated catalog.
#[derive(Debug, Clone)]
pub struct WorkflowCatalog {
    pub policy: PolicyConfig,
    pub workflows: Vec<WorkflowDef>,
}

impl WorkflowCatalog {
    /// The dashboard's default automations.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN)
    }

    /// Load a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read workflow catalog {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Load `path` if given, otherwise the built-in catalog.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(s).map_err(|e| Error::Config(format!("bad workflow catalog: {e}")))?;

        file.policy.validate()?;
        let mut seen = HashSet::new();
        for def in &file.workflows {
            def.validate()?;
            if !seen.insert(def.id.as_str()) {
                return Err(Error::Config(format!("duplicate workflow id '{}'", def.id)));
            }
        }

        Ok(Self {
            policy: file.policy,
            workflows: file.workflows,
        })
    }
}
