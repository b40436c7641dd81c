//! Worker and role registries.
//!
//! Worker profiles are produced offline by a benchmark process and
//! loaded once at startup; they are never mutated during a run. Roles
//! are static configuration describing what a worker needs to qualify
//! for a task and how the attempt loop is bounded.

use crate::core::task::RoleId;
use crate::{flog_debug, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Dimension score at or above this counts as a strength.
pub const STRENGTH_THRESHOLD: f64 = 70.0;
/// Dimension score below this counts as a weakness.
pub const WEAKNESS_THRESHOLD: f64 = 40.0;

fn default_tier_pass_threshold() -> f64 {
    60.0
}

/// Measured capability profile for one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub id: String,
    /// Aggregate benchmark score, 0 to 100.
    pub overall_score: f64,
    /// Score per complexity tier.
    #[serde(default)]
    pub tier_scores: BTreeMap<u8, f64>,
    /// Score per named capability axis.
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
}

impl WorkerProfile {
    /// Highest tier whose score clears the pass threshold, or 0 if none.
    pub fn max_tier(&self, pass_threshold: f64) -> u8 {
        self.tier_scores
            .iter()
            .filter(|(_, &score)| score >= pass_threshold)
            .map(|(&tier, _)| tier)
            .max()
            .unwrap_or(0)
    }

    /// Dimensions scoring at or above [`STRENGTH_THRESHOLD`].
    pub fn strengths(&self) -> BTreeSet<&str> {
        self.dimension_scores
            .iter()
            .filter(|(_, &score)| score >= STRENGTH_THRESHOLD)
            .map(|(dim, _)| dim.as_str())
            .collect()
    }

    /// Dimensions scoring below [`WEAKNESS_THRESHOLD`].
    pub fn weaknesses(&self) -> BTreeSet<&str> {
        self.dimension_scores
            .iter()
            .filter(|(_, &score)| score < WEAKNESS_THRESHOLD)
            .map(|(dim, _)| dim.as_str())
            .collect()
    }

    pub fn dimension(&self, dim: &str) -> Option<f64> {
        self.dimension_scores.get(dim).copied()
    }
}

/// Versioned catalog of worker profiles, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistry {
    /// Version of the benchmark run that produced these profiles.
    pub version: String,
    /// Tier score required for a tier to count as passed.
    #[serde(default = "default_tier_pass_threshold")]
    pub tier_pass_threshold: f64,
    pub profiles: Vec<WorkerProfile>,
}

impl WorkerRegistry {
    /// Registry with no profiles, for bootstrap scenarios.
    pub fn empty() -> Self {
        Self {
            version: "none".to_string(),
            tier_pass_threshold: default_tier_pass_threshold(),
            profiles: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let registry: Self = serde_json::from_str(&data)?;
        registry.check()?;
        flog_debug!(
            "WorkerRegistry loaded: version={}, {} profiles",
            registry.version,
            registry.profiles.len()
        );
        Ok(registry)
    }

    fn check(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for profile in &self.profiles {
            if !seen.insert(profile.id.as_str()) {
                return Err(Error::Registry(format!(
                    "duplicate worker profile '{}'",
                    profile.id
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, worker_id: &str) -> Option<&WorkerProfile> {
        self.profiles.iter().find(|p| p.id == worker_id)
    }
}

/// What a worker must demonstrate to qualify for a role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRequirement {
    pub min_score: f64,
    pub min_tier: u8,
    /// Dimensions that must be among the worker's strengths.
    #[serde(default)]
    pub critical_dimensions: BTreeSet<String>,
    /// Dimensions that boost ranking but do not gate eligibility.
    #[serde(default)]
    pub important_dimensions: BTreeSet<String>,
}

/// Static per-role configuration consumed by selection and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProfile {
    #[serde(default)]
    pub requirement: RoleRequirement,
    /// Iteration cap for the attempt loop; falls back to the config
    /// default when absent.
    pub max_iterations: Option<u32>,
    /// Tools this role's workers are allowed to invoke.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl Default for RoleProfile {
    fn default() -> Self {
        Self {
            requirement: RoleRequirement::default(),
            max_iterations: None,
            allowed_tools: Vec::new(),
        }
    }
}

/// Role catalog, loaded once at startup and never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRegistry {
    pub roles: BTreeMap<RoleId, RoleProfile>,
}

impl RoleRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let registry: Self = serde_json::from_str(&data)?;
        flog_debug!("RoleRegistry loaded: {} roles", registry.roles.len());
        Ok(registry)
    }

    pub fn get(&self, role: &RoleId) -> Result<&RoleProfile> {
        self.roles
            .get(role)
            .ok_or_else(|| Error::UnknownRole(role.to_string()))
    }

    /// Profile for a role, or a permissive default for unregistered
    /// roles so partially configured deployments still run.
    pub fn get_or_default(&self, role: &RoleId) -> RoleProfile {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, role: impl Into<RoleId>, profile: RoleProfile) {
        self.roles.insert(role.into(), profile);
    }
}
