//! Planning, validation, selection, and execution.
//!
//! This module holds the engine proper: the validator that rejects
//! structurally broken plans, the controller that drives the bounded
//! replanning loop, the capability-ranked worker selector, the worker
//! attempt loop, and the scheduler that executes an accepted plan.

pub mod context;
pub mod controller;
pub mod scheduler;
pub mod selector;
pub mod validator;
pub mod worker;

pub use context::{ContextProvider, EmptyContext, ProgressEntry, SessionStore};
pub use controller::{PlanController, PlanGenerator};
pub use scheduler::{
    ExecutionReport, RunOutcome, Scheduler, SchedulerEvent, TaskExecution,
};
pub use selector::{Selection, Selector};
pub use validator::{Rule, ValidationError, Validator};
pub use worker::{
    Attempt, AttemptDriver, AttemptOutcome, EchoWorker, NoopInvoker, ToolInvoker, ToolResult,
    Worker, WorkerSession, WorkerStep,
};
