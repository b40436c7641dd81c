//! Scheduler execution semantics: ordering, fallback, skips.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use foreman::config::Config;
use foreman::core::{Plan, Task, TaskId};
use foreman::orchestration::{RunOutcome, SchedulerEvent};
use foreman::registry::RoleRegistry;

use crate::fixtures::{
    diamond_plan, flat_profile, registry_for, run_plan, statuses, two_task_chain, FakeWorker,
    WorkerBehavior,
};

fn config() -> Config {
    let mut config = Config::default();
    config.tool_timeout_secs = 5;
    config.cancel_grace_secs = 1;
    config
}

fn started_position(events: &[SchedulerEvent], id: &str) -> usize {
    events
        .iter()
        .position(|e| matches!(e, SchedulerEvent::TaskStarted { task_id } if task_id.as_str() == id))
        .unwrap_or_else(|| panic!("task {} never started", id))
}

#[tokio::test]
async fn dependent_task_starts_only_after_dependency_finishes() {
    let worker = FakeWorker::new("m1", WorkerBehavior::SlowSucceed(Duration::from_millis(50)));
    let harness = run_plan(
        two_task_chain(),
        vec![worker],
        registry_for(vec![flat_profile("m1", 90.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::Success);
    let t1_done = harness
        .events
        .iter()
        .position(|e| matches!(e, SchedulerEvent::TaskSucceeded { task_id, .. } if task_id.as_str() == "t1"))
        .unwrap();
    assert!(started_position(&harness.events, "t2") > t1_done);
}

#[tokio::test]
async fn independent_tasks_run_and_every_task_is_terminal() {
    let worker = FakeWorker::new("m1", WorkerBehavior::SucceedAfter(1));
    let harness = run_plan(
        diamond_plan(),
        vec![worker.clone()],
        registry_for(vec![flat_profile("m1", 90.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::Success);
    assert_eq!(harness.report.executions.len(), 4);
    assert!(harness
        .report
        .executions
        .values()
        .all(|e| e.status.is_terminal()));
    assert_eq!(worker.invocation_count(), 4);
    // package runs last.
    let package = started_position(&harness.events, "package");
    assert!(package > started_position(&harness.events, "compile"));
    assert!(package > started_position(&harness.events, "docs"));
}

#[tokio::test]
async fn parallelism_bound_is_respected() {
    let plan = Plan::new(
        "six independent steps",
        1,
        (0..6)
            .map(|i| Task::new(format!("t{}", i), "coder", format!("Write /tmp/out{}.txt", i)))
            .collect(),
    );
    let worker = FakeWorker::new("m1", WorkerBehavior::SlowSucceed(Duration::from_millis(30)));
    let mut config = config();
    config.max_parallel_tasks = 2;

    let harness = run_plan(
        plan,
        vec![worker],
        registry_for(vec![flat_profile("m1", 90.0)]),
        RoleRegistry::default(),
        config,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::Success);
    // Replaying the event stream, concurrent starts never exceed two.
    let mut in_flight = 0usize;
    let mut peak = 0usize;
    for event in &harness.events {
        match event {
            SchedulerEvent::TaskStarted { .. } => {
                in_flight += 1;
                peak = peak.max(in_flight);
            }
            SchedulerEvent::TaskSucceeded { .. } | SchedulerEvent::TaskFailed { .. } => {
                in_flight = in_flight.saturating_sub(1);
            }
            _ => {}
        }
    }
    assert!(peak <= 2, "peak concurrency was {}", peak);
}

#[tokio::test]
async fn failed_dependency_skips_dependents_without_invoking_workers() {
    let failer = FakeWorker::new("bad", WorkerBehavior::Fail);
    let harness = run_plan(
        two_task_chain(),
        vec![failer.clone()],
        registry_for(vec![flat_profile("bad", 90.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::PartialFailure);
    let statuses = statuses(&harness.report);
    assert_eq!(statuses["t1"], "failed: worker_failure");
    assert_eq!(statuses["t2"], "skipped: dependency_failed");
    // Only t1 ever reached a worker.
    assert_eq!(failer.invocation_count(), 1);
    assert!(harness.report.executions[&TaskId::new("t2")].attempts.is_empty());
}

#[tokio::test]
async fn optional_task_runs_despite_failed_dependency() {
    let plan = Plan::new(
        "import with best-effort cleanup",
        1,
        vec![
            Task::new("import", "coder", "Import /data/dump.sql into the staging database"),
            Task::new("cleanup", "coder", "Delete /tmp/import.lock").depends_on("import").optional(),
        ],
    );
    // The import role fails, cleanup succeeds.
    let failer = FakeWorker::new("bad", WorkerBehavior::Fail);
    let harness = run_plan(
        plan,
        vec![failer],
        registry_for(vec![flat_profile("bad", 90.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    let statuses = statuses(&harness.report);
    assert_eq!(statuses["import"], "failed: worker_failure");
    // Optional dependent still ran (and failed with the same worker),
    // instead of being skipped.
    assert_ne!(statuses["cleanup"], "skipped: dependency_failed");
    assert!(!harness.report.executions[&TaskId::new("cleanup")].attempts.is_empty());
}

#[tokio::test]
async fn conditional_task_skipped_when_dependency_failed() {
    let plan = Plan::new(
        "deploy and announce",
        1,
        vec![
            Task::new("deploy", "devops", "Deploy build 42 to staging.example.com"),
            Task::new("announce", "writer", "Only if the deploy succeeded, write /tmp/announce.md")
                .depends_on("deploy"),
        ],
    );
    let failer = FakeWorker::new("bad", WorkerBehavior::Fail);
    let harness = run_plan(
        plan,
        vec![failer.clone()],
        registry_for(vec![flat_profile("bad", 90.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    let statuses = statuses(&harness.report);
    assert_eq!(statuses["announce"], "skipped: dependency_failed");
    assert_eq!(failer.invocation_count(), 1);
}

#[tokio::test]
async fn conditional_skip_without_dependency_failure() {
    let plan = Plan::new(
        "import with rollback",
        1,
        vec![
            Task::new("import", "coder", "Import /data/dump.sql into the staging database"),
            Task::new("rollback", "coder", "If the import failed, restore /backup/staging.sql")
                .depends_on("import")
                .optional(),
        ],
    );
    let worker = FakeWorker::new("m1", WorkerBehavior::SucceedAfter(0));
    let harness = run_plan(
        plan,
        vec![worker.clone()],
        registry_for(vec![flat_profile("m1", 90.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::Success);
    let statuses = statuses(&harness.report);
    assert_eq!(statuses["import"], "succeeded");
    assert_eq!(statuses["rollback"], "skipped: condition_not_met");
    // The rollback worker was never invoked.
    assert_eq!(worker.invocation_count(), 1);
}

#[tokio::test]
async fn fallback_worker_rescues_a_failing_primary() {
    let primary = FakeWorker::new("alpha", WorkerBehavior::Fail);
    let backup = FakeWorker::new("beta", WorkerBehavior::SucceedAfter(0));
    let plan = Plan::new(
        "single step",
        1,
        vec![Task::new("t1", "coder", "Write /tmp/out.txt")],
    );
    // alpha outranks beta; both share the planning strength.
    let harness = run_plan(
        plan,
        vec![primary.clone(), backup.clone()],
        registry_for(vec![flat_profile("alpha", 95.0), flat_profile("beta", 80.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::Success);
    let execution = &harness.report.executions[&TaskId::new("t1")];
    assert_eq!(execution.attempts.len(), 2);
    assert_eq!(execution.attempts[0].worker_id, "alpha");
    assert_eq!(execution.attempts[1].worker_id, "beta");
    assert_eq!(execution.chosen_worker.as_deref(), Some("beta"));
    assert!(execution.excluded.contains("alpha"));
}

#[tokio::test]
async fn all_workers_exhausted_fails_the_task() {
    let alpha = FakeWorker::new("alpha", WorkerBehavior::Fail);
    let beta = FakeWorker::new("beta", WorkerBehavior::Fail);
    let plan = Plan::new(
        "single step",
        1,
        vec![Task::new("t1", "coder", "Write /tmp/out.txt")],
    );
    let harness = run_plan(
        plan,
        vec![alpha, beta],
        registry_for(vec![flat_profile("alpha", 95.0), flat_profile("beta", 80.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::PartialFailure);
    let statuses = statuses(&harness.report);
    assert_eq!(statuses["t1"], "failed: worker_failure");
    let execution = &harness.report.executions[&TaskId::new("t1")];
    assert_eq!(execution.attempts.len(), 2);
}
