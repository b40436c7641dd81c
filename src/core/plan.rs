//! Plan data model.
//!
//! A plan is the output of one planning round: an ordered list of tasks
//! plus provenance. Plans are discarded when the validator rejects them
//! and become immutable once accepted by the plan controller.

use crate::core::task::{Task, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A candidate or accepted plan for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier for this plan instance.
    pub id: Uuid,
    /// The request this plan was generated for.
    pub request: String,
    /// Planning round that produced this plan (1-based).
    pub round: u32,
    /// Tasks in the order the generator emitted them.
    pub tasks: Vec<Task>,
    /// When this plan was created.
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(request: impl Into<String>, round: u32, tasks: Vec<Task>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request: request.into(),
            round,
            tasks,
            created_at: Utc::now(),
        }
    }

    /// Look up a task by id.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// True if `id` names a task in this plan.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.task(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
