//! Task data model for plan execution.
//!
//! Tasks are the atomic units of work assigned to workers. Ids are
//! assigned by the plan generator and are unique within one plan, so
//! they are plain strings rather than generated UUIDs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a task, unique within its plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a worker role (e.g. "researcher", "coder").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Why a task ended `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Every assigned worker (primary and fallbacks) reported failure.
    WorkerFailure,
    /// The attempt loop hit the role's iteration cap.
    IterationLimitExceeded,
    /// The run was cancelled while this task was running.
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::WorkerFailure => write!(f, "worker_failure"),
            FailureReason::IterationLimitExceeded => write!(f, "iteration_limit_exceeded"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why a task ended `Skipped` without a worker ever being invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A hard dependency reached `Failed`.
    DependencyFailed,
    /// A conditional description referenced an outcome that did not hold.
    ConditionNotMet,
    /// The run was cancelled before this task started.
    RunCancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DependencyFailed => write!(f, "dependency_failed"),
            SkipReason::ConditionNotMet => write!(f, "condition_not_met"),
            SkipReason::RunCancelled => write!(f, "run_cancelled"),
        }
    }
}

/// Task status in its lifecycle.
///
/// Tasks progress through these states as dependencies resolve and
/// workers run. `Succeeded`, `Failed`, and `Skipped` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task created but dependencies not yet terminal.
    Pending,
    /// All dependencies terminal, waiting for a dispatch slot.
    Ready,
    /// A worker is currently executing this task.
    Running,
    /// Task completed successfully.
    Succeeded,
    /// Task was attempted and lost.
    Failed {
        /// Terminal reason for the failure.
        reason: FailureReason,
    },
    /// Task was never attempted.
    Skipped {
        /// Why the task did not run.
        reason: SkipReason,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    /// True once the status can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed { .. } | TaskStatus::Skipped { .. }
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed { reason } => write!(f, "failed: {}", reason),
            TaskStatus::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// A single task in a plan.
///
/// Descriptions must be self-contained: any literal value a task needs
/// has to appear verbatim in its own description, never as a prose
/// reference to another task's output. Workers are stateless and cannot
/// resolve such references. The validator enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Identifier unique within the plan.
    pub id: TaskId,
    /// Role this task should be assigned to.
    pub role: RoleId,
    /// Self-contained description of the work.
    pub description: String,
    /// Ids of tasks that must reach a terminal state first.
    #[serde(default)]
    pub depends_on: BTreeSet<TaskId>,
    /// Optional tasks do not cascade skips to their dependents on failure.
    #[serde(default)]
    pub optional: bool,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, role: impl Into<RoleId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            description: description.into(),
            depends_on: BTreeSet::new(),
            optional: false,
        }
    }

    /// Builder-style helper to add a dependency.
    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    /// Builder-style helper to mark the task optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}
