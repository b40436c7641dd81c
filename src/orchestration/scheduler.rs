//! Scheduler and executor for accepted plans.
//!
//! The scheduler walks the dependency graph, dispatching ready tasks
//! up to the parallelism bound and driving each through worker
//! selection, the bounded attempt loop, and fallback retry. Every task
//! ends in exactly one terminal state; the run never aborts early on a
//! single task failure and always produces a complete report. It emits
//! events for each state change so external observers need not poll.

use crate::config::Config;
use crate::core::dag::PlanGraph;
use crate::core::plan::Plan;
use crate::core::task::{FailureReason, RoleId, SkipReason, Task, TaskId, TaskStatus};
use crate::orchestration::context::{ContextProvider, ProgressEntry};
use crate::orchestration::selector::Selector;
use crate::orchestration::worker::{Attempt, AttemptDriver, AttemptOutcome, Worker};
use crate::registry::{RoleProfile, RoleRegistry};
use crate::{flog, flog_debug, flog_warn, Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Events emitted by the scheduler for task lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A task started running.
    TaskStarted { task_id: TaskId },
    /// A task completed successfully.
    TaskSucceeded {
        task_id: TaskId,
        worker_id: String,
        iterations: u32,
    },
    /// A task was attempted and lost.
    TaskFailed {
        task_id: TaskId,
        reason: FailureReason,
    },
    /// A task was never attempted.
    TaskSkipped { task_id: TaskId, reason: SkipReason },
    /// Every task reached a terminal state.
    RunComplete { outcome: RunOutcome },
}

/// Overall classification of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every non-conditional task succeeded.
    Success,
    /// At least one task failed or was skipped on a failed dependency.
    PartialFailure,
    /// The run was cancelled before completion.
    Cancelled,
}

/// Per-task execution record, mutated only by the scheduler and
/// terminal once status reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task_id: TaskId,
    pub role: RoleId,
    pub status: TaskStatus,
    pub attempts: Vec<Attempt>,
    /// Worker of the last attempt, if any worker was invoked.
    pub chosen_worker: Option<String>,
    /// Workers recorded as failed for this task.
    pub excluded: BTreeSet<String>,
}

impl TaskExecution {
    fn pending(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            role: task.role.clone(),
            status: TaskStatus::Pending,
            attempts: Vec::new(),
            chosen_worker: None,
            excluded: BTreeSet::new(),
        }
    }
}

/// Aggregate record of one plan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub request: String,
    /// Planning round that produced the executed plan.
    pub round: u32,
    pub outcome: RunOutcome,
    pub executions: BTreeMap<TaskId, TaskExecution>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Persist the report as `<run_id>.json` under `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        flog_debug!("report saved to {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Result of one spawned task future.
struct TaskDone {
    task_id: TaskId,
    status: TaskStatus,
    attempts: Vec<Attempt>,
    chosen_worker: Option<String>,
    excluded: BTreeSet<String>,
}

/// Conditional-language check against dependency outcomes.
///
/// A description like "only if t1 succeeded" gates the task on the
/// recorded status of its dependencies instead of invoking a worker.
/// A task with no dependencies has no outcome to gate on, so
/// conditional phrasing in a root task never suppresses execution.
fn condition_satisfied(description: &str, dep_statuses: &[&TaskStatus]) -> Option<bool> {
    static SUCCESS_RE: OnceLock<Regex> = OnceLock::new();
    static FAILURE_RE: OnceLock<Regex> = OnceLock::new();
    let success_re = SUCCESS_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(only\s+)?if\b.{0,60}\b(succeeded|succeeds|completed successfully)\b")
            .unwrap()
    });
    let failure_re = FAILURE_RE
        .get_or_init(|| Regex::new(r"(?i)\b(only\s+)?if\b.{0,60}\b(failed|fails)\b").unwrap());

    if dep_statuses.is_empty() {
        return None;
    }
    if success_re.is_match(description) {
        return Some(dep_statuses.iter().all(|s| matches!(s, TaskStatus::Succeeded)));
    }
    if failure_re.is_match(description) {
        return Some(dep_statuses.iter().any(|s| matches!(s, TaskStatus::Failed { .. })));
    }
    None
}

/// Scheduler for one accepted plan.
pub struct Scheduler {
    plan: Plan,
    graph: PlanGraph,
    roles: Arc<RoleRegistry>,
    selector: Arc<Selector>,
    driver: Arc<AttemptDriver>,
    workers: Arc<HashMap<String, Arc<dyn Worker>>>,
    context: Arc<dyn ContextProvider>,
    session_id: String,
    max_parallel_tasks: usize,
    event_tx: mpsc::Sender<SchedulerEvent>,
    cancel: CancellationToken,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plan: Plan,
        roles: Arc<RoleRegistry>,
        selector: Arc<Selector>,
        driver: Arc<AttemptDriver>,
        workers: Arc<HashMap<String, Arc<dyn Worker>>>,
        context: Arc<dyn ContextProvider>,
        config: &Config,
        event_tx: mpsc::Sender<SchedulerEvent>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let graph = PlanGraph::from_plan(&plan)
            .map_err(|e| Error::Validation(format!("plan is not executable: {}", e)))?;
        Ok(Self {
            plan,
            graph,
            roles,
            selector,
            driver,
            workers,
            context,
            session_id: Uuid::new_v4().to_string(),
            max_parallel_tasks: config.max_parallel_tasks.max(1),
            event_tx,
            cancel,
        })
    }

    /// Token observers can use to cancel the run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the plan to completion and return the full report.
    pub async fn run(mut self) -> Result<ExecutionReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        flog!(
            "run {} started: {} tasks, parallelism {}",
            run_id,
            self.plan.tasks.len(),
            self.max_par_or_len()
        );

        let mut executions: BTreeMap<TaskId, TaskExecution> = self
            .plan
            .tasks
            .iter()
            .map(|t| (t.id.clone(), TaskExecution::pending(t)))
            .collect();

        let (done_tx, mut done_rx) = mpsc::channel::<TaskDone>(self.plan.tasks.len().max(1));
        let mut running: HashSet<TaskId> = HashSet::new();
        let mut cancelled = false;

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                self.skip_all_waiting(&mut executions, SkipReason::RunCancelled).await;
            }

            if !cancelled {
                self.cascade_and_dispatch(&mut executions, &mut running, &done_tx).await;
            }

            if executions.values().all(|e| e.status.is_terminal()) {
                break;
            }

            if running.is_empty() {
                if cancelled {
                    // Nothing left in flight; remaining tasks were skipped.
                    self.skip_all_waiting(&mut executions, SkipReason::RunCancelled).await;
                    continue;
                }
                // Every non-terminal task is blocked on a terminal
                // dependency; the cascade pass resolves them, so an
                // empty running set here means no progress was made.
                flog_warn!("scheduler made no progress with {} tasks unresolved",
                    executions.values().filter(|e| !e.status.is_terminal()).count());
                self.skip_all_waiting(&mut executions, SkipReason::DependencyFailed).await;
                continue;
            }

            tokio::select! {
                Some(done) = done_rx.recv() => {
                    running.remove(&done.task_id);
                    self.record_done(&mut executions, done).await;
                }
                _ = self.cancel.cancelled(), if !cancelled => {
                    // Handled at the top of the loop.
                }
            }
        }

        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else {
            classify(&executions)
        };
        let _ = self.event_tx.send(SchedulerEvent::RunComplete { outcome }).await;
        flog!("run {} finished: {:?}", run_id, outcome);

        Ok(ExecutionReport {
            run_id,
            request: self.plan.request.clone(),
            round: self.plan.round,
            outcome,
            executions,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn max_par_or_len(&self) -> usize {
        self.max_parallel_tasks.min(self.plan.tasks.len().max(1))
    }

    /// Skip-cascade failed dependencies, then start ready tasks up to
    /// the parallelism bound.
    async fn cascade_and_dispatch(
        &mut self,
        executions: &mut BTreeMap<TaskId, TaskExecution>,
        running: &mut HashSet<TaskId>,
        done_tx: &mpsc::Sender<TaskDone>,
    ) {
        loop {
            let terminal: HashSet<TaskId> = executions
                .iter()
                .filter(|(_, e)| e.status.is_terminal())
                .map(|(id, _)| id.clone())
                .collect();

            let ready: Vec<TaskId> = self
                .graph
                .ready_tasks(&terminal)
                .into_iter()
                .filter(|id| !running.contains(id))
                .collect();

            let mut skipped_any = false;
            for task_id in ready {
                let Some(task) = self.plan.task(&task_id).cloned() else {
                    continue;
                };

                let dep_statuses: Vec<&TaskStatus> = task
                    .depends_on
                    .iter()
                    .map(|dep| &executions[dep].status)
                    .collect();

                // Hard dependency lost and this task is not optional.
                let dep_lost = dep_statuses.iter().any(|s| {
                    matches!(s, TaskStatus::Failed { .. } | TaskStatus::Skipped { .. })
                });
                if dep_lost && !task.optional {
                    self.mark_skipped(executions, &task_id, SkipReason::DependencyFailed).await;
                    skipped_any = true;
                    continue;
                }

                // Conditional descriptions gate on recorded outcomes
                // without ever invoking a worker.
                if let Some(satisfied) = condition_satisfied(&task.description, &dep_statuses) {
                    if !satisfied {
                        self.mark_skipped(executions, &task_id, SkipReason::ConditionNotMet).await;
                        skipped_any = true;
                        continue;
                    }
                }

                if running.len() >= self.max_parallel_tasks {
                    // Dispatchable but capped; picked up when a slot frees.
                    if let Some(execution) = executions.get_mut(&task_id) {
                        execution.status = TaskStatus::Ready;
                    }
                    continue;
                }

                self.start_task(executions, running, done_tx, task).await;
            }

            // A skip may unblock (or doom) further dependents.
            if !skipped_any {
                break;
            }
        }
    }

    async fn start_task(
        &self,
        executions: &mut BTreeMap<TaskId, TaskExecution>,
        running: &mut HashSet<TaskId>,
        done_tx: &mpsc::Sender<TaskDone>,
        task: Task,
    ) {
        if let Some(execution) = executions.get_mut(&task.id) {
            execution.status = TaskStatus::Running;
        }
        running.insert(task.id.clone());
        let _ = self
            .event_tx
            .send(SchedulerEvent::TaskStarted {
                task_id: task.id.clone(),
            })
            .await;
        flog_debug!("task '{}' started (role '{}')", task.id, task.role);

        let role_profile = self.roles.get_or_default(&task.role);
        let selector = self.selector.clone();
        let driver = self.driver.clone();
        let workers = self.workers.clone();
        let context = self.context.clone();
        let session_id = self.session_id.clone();
        let cancel = self.cancel.clone();
        let done_tx = done_tx.clone();

        tokio::spawn(async move {
            let done = execute_task(
                task, role_profile, selector, driver, workers, context, session_id, cancel,
            )
            .await;
            let _ = done_tx.send(done).await;
        });
    }

    async fn mark_skipped(
        &self,
        executions: &mut BTreeMap<TaskId, TaskExecution>,
        task_id: &TaskId,
        reason: SkipReason,
    ) {
        if let Some(execution) = executions.get_mut(task_id) {
            execution.status = TaskStatus::Skipped {
                reason: reason.clone(),
            };
        }
        flog_debug!("task '{}' skipped: {}", task_id, reason);
        let _ = self
            .event_tx
            .send(SchedulerEvent::TaskSkipped {
                task_id: task_id.clone(),
                reason,
            })
            .await;
    }

    /// Transition every non-terminal, non-running task to skipped.
    async fn skip_all_waiting(
        &self,
        executions: &mut BTreeMap<TaskId, TaskExecution>,
        reason: SkipReason,
    ) {
        let waiting: Vec<TaskId> = executions
            .iter()
            .filter(|(_, e)| {
                !e.status.is_terminal() && !matches!(e.status, TaskStatus::Running)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for task_id in waiting {
            self.mark_skipped(executions, &task_id, reason.clone()).await;
        }
    }

    async fn record_done(&self, executions: &mut BTreeMap<TaskId, TaskExecution>, done: TaskDone) {
        let event = match &done.status {
            TaskStatus::Succeeded => {
                let last = done.attempts.last();
                SchedulerEvent::TaskSucceeded {
                    task_id: done.task_id.clone(),
                    worker_id: done.chosen_worker.clone().unwrap_or_default(),
                    iterations: last.map(|a| a.iterations).unwrap_or(0),
                }
            }
            TaskStatus::Failed { reason } => SchedulerEvent::TaskFailed {
                task_id: done.task_id.clone(),
                reason: reason.clone(),
            },
            other => {
                flog_warn!("task '{}' finished in non-terminal state {}", done.task_id, other);
                SchedulerEvent::TaskFailed {
                    task_id: done.task_id.clone(),
                    reason: FailureReason::WorkerFailure,
                }
            }
        };

        if let Some(execution) = executions.get_mut(&done.task_id) {
            execution.status = done.status;
            execution.attempts = done.attempts;
            execution.chosen_worker = done.chosen_worker;
            execution.excluded = done.excluded;
        }
        let _ = self.event_tx.send(event).await;
    }
}

/// Per-task execution: selection, attempt loop, fallback retry.
#[allow(clippy::too_many_arguments)]
async fn execute_task(
    task: Task,
    role_profile: RoleProfile,
    selector: Arc<Selector>,
    driver: Arc<AttemptDriver>,
    workers: Arc<HashMap<String, Arc<dyn Worker>>>,
    context_provider: Arc<dyn ContextProvider>,
    session_id: String,
    cancel: CancellationToken,
) -> TaskDone {
    let mut attempts: Vec<Attempt> = Vec::new();
    let mut excluded: BTreeSet<String> = BTreeSet::new();
    let mut chosen_worker: Option<String> = None;

    let context = match context_provider
        .get_context(&session_id, &task.role, &task.description)
        .await
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            flog_warn!("context provider failed for task '{}': {}", task.id, e);
            String::new()
        }
    };

    let mut available: Vec<String> = workers.keys().cloned().collect();
    available.sort();

    let selection = match selector.select(
        task.role.as_str(),
        &role_profile.requirement,
        &excluded,
        &available,
    ) {
        Ok(selection) => selection,
        Err(e) => {
            flog_warn!("no worker for task '{}': {}", task.id, e);
            return TaskDone {
                task_id: task.id,
                status: TaskStatus::Failed {
                    reason: FailureReason::WorkerFailure,
                },
                attempts,
                chosen_worker,
                excluded,
            };
        }
    };

    let mut queue: VecDeque<String> = std::iter::once(selection.primary)
        .chain(selection.fallbacks)
        .collect();
    let mut hit_iteration_limit = false;

    while let Some(worker_id) = queue.pop_front() {
        if cancel.is_cancelled() {
            return TaskDone {
                task_id: task.id,
                status: TaskStatus::Failed {
                    reason: FailureReason::Cancelled,
                },
                attempts,
                chosen_worker,
                excluded,
            };
        }

        let Some(worker) = workers.get(&worker_id) else {
            attempts.push(
                Attempt::new(&worker_id, 0, AttemptOutcome::WorkerFailed)
                    .with_error("worker is not registered"),
            );
            excluded.insert(worker_id);
            continue;
        };

        chosen_worker = Some(worker_id.clone());
        let attempt = driver
            .drive(
                worker.as_ref(),
                &task.role,
                &role_profile,
                &task.description,
                &context,
                &cancel,
            )
            .await;
        let outcome = attempt.outcome.clone();
        let detail = attempt.detail.clone();
        attempts.push(attempt);

        match outcome {
            AttemptOutcome::Succeeded => {
                let entry = ProgressEntry::new(
                    task.id.to_string(),
                    detail.unwrap_or_else(|| "succeeded".to_string()),
                );
                if let Err(e) = context_provider.record_progress(&session_id, entry).await {
                    flog_warn!("progress write failed for task '{}': {}", task.id, e);
                }
                return TaskDone {
                    task_id: task.id,
                    status: TaskStatus::Succeeded,
                    attempts,
                    chosen_worker,
                    excluded,
                };
            }
            AttemptOutcome::Cancelled => {
                return TaskDone {
                    task_id: task.id,
                    status: TaskStatus::Failed {
                        reason: FailureReason::Cancelled,
                    },
                    attempts,
                    chosen_worker,
                    excluded,
                };
            }
            AttemptOutcome::IterationLimit => {
                hit_iteration_limit = true;
                excluded.insert(worker_id);
            }
            AttemptOutcome::WorkerFailed => {
                excluded.insert(worker_id);
            }
        }
    }

    // Primary and every fallback exhausted.
    let reason = if hit_iteration_limit {
        FailureReason::IterationLimitExceeded
    } else {
        FailureReason::WorkerFailure
    };
    TaskDone {
        task_id: task.id,
        status: TaskStatus::Failed { reason },
        attempts,
        chosen_worker,
        excluded,
    }
}

fn classify(executions: &BTreeMap<TaskId, TaskExecution>) -> RunOutcome {
    let lost = executions.values().any(|e| {
        matches!(
            e.status,
            TaskStatus::Failed { .. }
                | TaskStatus::Skipped {
                    reason: SkipReason::DependencyFailed
                }
                | TaskStatus::Skipped {
                    reason: SkipReason::RunCancelled
                }
        )
    });
    if lost {
        RunOutcome::PartialFailure
    } else {
        RunOutcome::Success
    }
}
