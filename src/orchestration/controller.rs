//! Plan controller: bounded generate/validate/retry loop.
//!
//! The plan generator is an opaque strategy (a language model in
//! production, a deterministic fake in tests). The controller calls it
//! with cumulative structured feedback until a plan passes validation
//! or the round budget is exhausted. An unvalidated plan is never
//! handed to the scheduler.

use crate::config::Config;
use crate::core::plan::Plan;
use crate::orchestration::validator::{ValidationError, Validator};
use crate::{flog, flog_warn, Error, Result};
use async_trait::async_trait;

/// Pluggable plan generation strategy.
///
/// No determinism is guaranteed; the controller may call it several
/// times for one request, each time with the accumulated errors from
/// every rejected round.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate_plan(
        &self,
        request: &str,
        context: &str,
        feedback: &[ValidationError],
    ) -> Result<Plan>;
}

/// Drives the generator/validator loop.
pub struct PlanController<G: PlanGenerator> {
    generator: G,
    validator: Validator,
    max_rounds: u32,
}

impl<G: PlanGenerator> PlanController<G> {
    pub fn new(generator: G, validator: Validator, config: &Config) -> Self {
        Self {
            generator,
            validator,
            max_rounds: config.max_rounds.max(1),
        }
    }

    /// Consume the controller and recover the generator.
    pub fn into_generator(self) -> G {
        self.generator
    }

    /// Propose a validated plan for `request`.
    ///
    /// Calls the generator at most `max_rounds` times. Each rejected
    /// round's errors are appended to the feedback passed to the next
    /// call, so the generator sees the full correction history rather
    /// than a single opaque failure. Returns
    /// [`Error::PlanRejected`] once the budget is exhausted.
    pub async fn propose(&self, request: &str, context: &str) -> Result<Plan> {
        let mut accumulated: Vec<ValidationError> = Vec::new();

        for round in 1..=self.max_rounds {
            let mut plan = self.generator.generate_plan(request, context, &accumulated).await?;
            plan.round = round;

            let errors = self.validator.validate(&plan, request);
            if errors.is_empty() {
                flog!(
                    "Plan accepted on round {}/{}: {} tasks",
                    round,
                    self.max_rounds,
                    plan.tasks.len()
                );
                return Ok(plan);
            }

            flog_warn!(
                "Plan rejected on round {}/{}: {} errors",
                round,
                self.max_rounds,
                errors.len()
            );
            accumulated.extend(errors);
        }

        Err(Error::PlanRejected {
            rounds: self.max_rounds,
            errors: accumulated,
        })
    }
}
