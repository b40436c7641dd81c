//! Worker boundary and the bounded attempt loop.
//!
//! A worker is an opaque, stateless executor of a single task. The
//! engine drives it through a step API: on each iteration the worker
//! either requests a tool call or declares itself done. Iterations are
//! strictly sequential because the worker cannot decide step N+1
//! without the result of step N's tool call. The loop is capped at the
//! role's iteration limit so a confused worker cannot spin forever.

use crate::config::Config;
use crate::core::task::RoleId;
use crate::registry::RoleProfile;
use crate::{flog_debug, flog_trace, flog_warn, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of one tool call as seen by the worker: the tool's JSON
/// payload, or an error string that consumes the iteration.
pub type ToolResult = std::result::Result<serde_json::Value, String>;

/// What the worker wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStep {
    /// Invoke a tool and feed the result back next iteration.
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// Terminal answer for this task.
    Done { success: bool, detail: String },
}

/// A stateless worker. One `start` call per attempt; the returned
/// session holds whatever per-attempt state the worker needs.
#[async_trait]
pub trait Worker: Send + Sync {
    fn id(&self) -> &str;

    async fn start(
        &self,
        role: &RoleId,
        description: &str,
        context: &str,
    ) -> Result<Box<dyn WorkerSession>>;
}

/// Iteration state for one attempt at one task.
#[async_trait]
pub trait WorkerSession: Send {
    /// Produce the next step. `last_result` is `None` on the first
    /// iteration, otherwise the previous tool call's result.
    async fn next_step(&mut self, last_result: Option<ToolResult>) -> Result<WorkerStep>;
}

/// Remote-call boundary for side-effecting actions. Treated as a black
/// box; no wire format is assumed here.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn call(&self, tool: &str, args: serde_json::Value) -> Result<serde_json::Value>;
}

/// Invoker that accepts every call and returns null. Used by the CLI
/// demo path where workers have no real tools.
pub struct NoopInvoker;

#[async_trait]
impl ToolInvoker for NoopInvoker {
    async fn call(&self, tool: &str, _args: serde_json::Value) -> Result<serde_json::Value> {
        flog_trace!("noop invoker called for tool '{}'", tool);
        Ok(serde_json::Value::Null)
    }
}

/// Built-in worker that immediately reports success. Serves as the
/// degraded-mode default for the CLI.
pub struct EchoWorker {
    id: String,
}

impl EchoWorker {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Worker for EchoWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(
        &self,
        _role: &RoleId,
        description: &str,
        _context: &str,
    ) -> Result<Box<dyn WorkerSession>> {
        Ok(Box::new(EchoSession {
            detail: format!("echo: {}", description),
        }))
    }
}

struct EchoSession {
    detail: String,
}

#[async_trait]
impl WorkerSession for EchoSession {
    async fn next_step(&mut self, _last_result: Option<ToolResult>) -> Result<WorkerStep> {
        Ok(WorkerStep::Done {
            success: true,
            detail: self.detail.clone(),
        })
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    /// Worker reported failure, errored, or could not be started.
    WorkerFailed,
    /// The circuit breaker tripped.
    IterationLimit,
    Cancelled,
}

/// Record of one worker's attempt at one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub worker_id: String,
    /// Iterations consumed, including the terminal one.
    pub iterations: u32,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
    /// Worker-reported detail on success.
    pub detail: Option<String>,
}

impl Attempt {
    pub fn new(worker_id: &str, iterations: u32, outcome: AttemptOutcome) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            iterations,
            outcome,
            error: None,
            detail: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Drives workers through the bounded attempt loop.
pub struct AttemptDriver {
    invoker: Arc<dyn ToolInvoker>,
    tool_timeout: Duration,
    cancel_grace: Duration,
    default_max_iterations: u32,
}

impl AttemptDriver {
    pub fn new(invoker: Arc<dyn ToolInvoker>, config: &Config) -> Self {
        Self {
            invoker,
            tool_timeout: config.tool_timeout(),
            cancel_grace: config.cancel_grace(),
            default_max_iterations: config.default_max_iterations.max(1),
        }
    }

    /// Run one attempt of `worker` against a task.
    ///
    /// A tool error or timeout is surfaced to the worker and consumes
    /// one iteration; it never aborts the attempt by itself. The loop
    /// stops at the role's iteration cap. Cancellation abandons an
    /// in-flight worker step outright; an in-flight tool call gets the
    /// configured grace period to finish first.
    pub async fn drive(
        &self,
        worker: &dyn Worker,
        role: &RoleId,
        role_profile: &RoleProfile,
        description: &str,
        context: &str,
        cancel: &CancellationToken,
    ) -> Attempt {
        let max_iterations = role_profile
            .max_iterations
            .unwrap_or(self.default_max_iterations)
            .max(1);

        let mut session = match worker.start(role, description, context).await {
            Ok(session) => session,
            Err(e) => {
                return Attempt::new(worker.id(), 0, AttemptOutcome::WorkerFailed)
                    .with_error(format!("worker start failed: {}", e));
            }
        };

        let mut last_result: Option<ToolResult> = None;
        let mut iterations: u32 = 0;

        while iterations < max_iterations {
            if cancel.is_cancelled() {
                return Attempt::new(worker.id(), iterations, AttemptOutcome::Cancelled);
            }
            iterations += 1;

            // A worker step is abandoned outright on cancellation;
            // only tool calls get the grace period.
            let step = tokio::select! {
                step = session.next_step(last_result.take()) => match step {
                    Ok(step) => step,
                    Err(e) => {
                        return Attempt::new(worker.id(), iterations, AttemptOutcome::WorkerFailed)
                            .with_error(e.to_string());
                    }
                },
                _ = cancel.cancelled() => {
                    return Attempt::new(worker.id(), iterations, AttemptOutcome::Cancelled);
                }
            };

            match step {
                WorkerStep::Done { success: true, detail } => {
                    flog_debug!(
                        "worker '{}' succeeded after {} iterations",
                        worker.id(),
                        iterations
                    );
                    let mut attempt =
                        Attempt::new(worker.id(), iterations, AttemptOutcome::Succeeded);
                    attempt.detail = Some(detail);
                    return attempt;
                }
                WorkerStep::Done { success: false, detail } => {
                    flog_warn!("worker '{}' reported failure: {}", worker.id(), detail);
                    return Attempt::new(worker.id(), iterations, AttemptOutcome::WorkerFailed)
                        .with_error(detail);
                }
                WorkerStep::ToolCall { tool, args } => {
                    if !role_profile.allowed_tools.is_empty()
                        && !role_profile.allowed_tools.iter().any(|t| t == &tool)
                    {
                        last_result = Some(Err(format!(
                            "tool '{}' is not allowed for role '{}'",
                            tool, role
                        )));
                        continue;
                    }

                    let call = tokio::time::timeout(self.tool_timeout, self.invoker.call(&tool, args));
                    tokio::pin!(call);
                    tokio::select! {
                        result = &mut call => {
                            last_result = Some(match result {
                                Ok(Ok(value)) => Ok(value),
                                Ok(Err(e)) => Err(format!("tool '{}' failed: {}", tool, e)),
                                Err(_) => Err(format!(
                                    "tool '{}' timed out after {:?}",
                                    tool, self.tool_timeout
                                )),
                            });
                        }
                        _ = cancel.cancelled() => {
                            // Grace period for the in-flight call, then abandon.
                            let _ = tokio::time::timeout(self.cancel_grace, &mut call).await;
                            return Attempt::new(worker.id(), iterations, AttemptOutcome::Cancelled);
                        }
                    }
                }
            }
        }

        flog_warn!(
            "worker '{}' hit the iteration cap of {}",
            worker.id(),
            max_iterations
        );
        Attempt::new(worker.id(), iterations, AttemptOutcome::IterationLimit)
            .with_error(format!("iteration cap of {} reached", max_iterations))
    }
}
