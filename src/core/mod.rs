//! Core domain models for the foreman engine.
//!
//! This module contains the fundamental data structures used throughout
//! the engine: tasks, plans, and the dependency graph built from them.

pub mod dag;
pub mod plan;
pub mod task;

pub use dag::PlanGraph;
pub use plan::Plan;
pub use task::{FailureReason, RoleId, SkipReason, Task, TaskId, TaskStatus};
