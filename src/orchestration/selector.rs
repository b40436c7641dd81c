//! Capability-ranked worker selection.
//!
//! Given a role requirement and the set of currently available
//! workers, the selector filters for eligibility, ranks by a weighted
//! capability score, and returns a primary plus fallback workers. The
//! whole procedure is deterministic: identical inputs always yield the
//! same ordering.

use crate::config::Config;
use crate::registry::{RoleRequirement, WorkerRegistry};
use crate::{flog_debug, flog_warn, Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Ranking weight applied to critical dimension scores.
const CRITICAL_WEIGHT: f64 = 0.10;
/// Ranking weight applied to important dimension scores.
const IMPORTANT_WEIGHT: f64 = 0.05;
/// Score assumed for workers with no benchmark profile.
const NEUTRAL_SCORE: f64 = 50.0;

/// Outcome of one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub primary: String,
    /// Ordered fallback workers, best first.
    pub fallbacks: Vec<String>,
    /// True when no worker was eligible and the configured default
    /// worker was substituted outside the scoring system.
    pub degraded: bool,
}

pub struct Selector {
    registry: Arc<WorkerRegistry>,
    fallback_count: usize,
    default_worker: Option<String>,
}

impl Selector {
    pub fn new(registry: Arc<WorkerRegistry>, config: &Config) -> Self {
        Self {
            registry,
            fallback_count: config.fallback_count,
            default_worker: config.default_worker.clone(),
        }
    }

    /// Pick a primary worker and fallbacks for one task.
    ///
    /// `exclude` holds workers already recorded as failed for this
    /// task. If no worker is eligible the configured default worker is
    /// returned in degraded mode; [`Error::NoWorkerAvailable`] only
    /// when there is no default either.
    pub fn select(
        &self,
        role: &str,
        requirement: &RoleRequirement,
        exclude: &BTreeSet<String>,
        available: &[String],
    ) -> Result<Selection> {
        let mut ranked: Vec<(String, f64)> = available
            .iter()
            .filter(|id| !exclude.contains(id.as_str()))
            .filter(|id| self.is_eligible(id, requirement))
            .map(|id| (id.clone(), self.rank_score(id, requirement)))
            .collect();

        // Descending by score, ascending by id on ties.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let Some((primary, primary_score)) = ranked.first().cloned() else {
            return self.degraded(role, exclude);
        };

        let primary_strengths = self.strengths_of(&primary);
        let fallbacks: Vec<String> = ranked
            .iter()
            .skip(1)
            .filter(|(id, _)| self.strengths_overlap(&primary_strengths, id))
            .take(self.fallback_count)
            .map(|(id, _)| id.clone())
            .collect();

        flog_debug!(
            "selected worker '{}' (score {:.1}) for role '{}' with {} fallbacks",
            primary,
            primary_score,
            role,
            fallbacks.len()
        );
        Ok(Selection {
            primary,
            fallbacks,
            degraded: false,
        })
    }

    fn degraded(&self, role: &str, exclude: &BTreeSet<String>) -> Result<Selection> {
        match &self.default_worker {
            Some(default) if !exclude.contains(default.as_str()) => {
                flog_warn!(
                    "no eligible worker for role '{}', degrading to default '{}'",
                    role,
                    default
                );
                Ok(Selection {
                    primary: default.clone(),
                    fallbacks: Vec::new(),
                    degraded: true,
                })
            }
            _ => Err(Error::NoWorkerAvailable {
                role: role.to_string(),
            }),
        }
    }

    /// Workers without a profile are treated as eligible with a
    /// neutral score so empty-registry bootstrap deployments can run.
    fn is_eligible(&self, worker_id: &str, requirement: &RoleRequirement) -> bool {
        let Some(profile) = self.registry.get(worker_id) else {
            return true;
        };
        if profile.overall_score < requirement.min_score {
            return false;
        }
        if profile.max_tier(self.registry.tier_pass_threshold) < requirement.min_tier {
            return false;
        }
        let strengths = profile.strengths();
        requirement
            .critical_dimensions
            .iter()
            .all(|dim| strengths.contains(dim.as_str()))
    }

    fn rank_score(&self, worker_id: &str, requirement: &RoleRequirement) -> f64 {
        let Some(profile) = self.registry.get(worker_id) else {
            return NEUTRAL_SCORE;
        };
        let critical: f64 = requirement
            .critical_dimensions
            .iter()
            .filter_map(|dim| profile.dimension(dim))
            .sum();
        let important: f64 = requirement
            .important_dimensions
            .iter()
            .filter_map(|dim| profile.dimension(dim))
            .sum();
        profile.overall_score + CRITICAL_WEIGHT * critical + IMPORTANT_WEIGHT * important
    }

    fn strengths_of(&self, worker_id: &str) -> BTreeSet<String> {
        self.registry
            .get(worker_id)
            .map(|p| p.strengths().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// A fallback must share at least half of the primary's strengths
    /// so it plausibly covers the same ground. An unprofiled primary
    /// has no strengths to cover, so everything qualifies.
    fn strengths_overlap(&self, primary_strengths: &BTreeSet<String>, candidate: &str) -> bool {
        if primary_strengths.is_empty() {
            return true;
        }
        let candidate_strengths = self.strengths_of(candidate);
        let shared = primary_strengths
            .iter()
            .filter(|s| candidate_strengths.contains(s.as_str()))
            .count();
        shared * 2 >= primary_strengths.len()
    }
}
