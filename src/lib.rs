pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod registry;

pub use config::Config;
pub use core::{Plan, PlanGraph, RoleId, Task, TaskId, TaskStatus};
pub use error::{Error, Result};
pub use orchestration::{
    ExecutionReport, PlanController, PlanGenerator, RunOutcome, Scheduler, SchedulerEvent,
    Selector, ValidationError, Validator,
};
pub use registry::{RoleProfile, RoleRegistry, RoleRequirement, WorkerProfile, WorkerRegistry};
