//! Circuit breaker, degraded selection, and cancellation semantics.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use foreman::config::Config;
use foreman::core::{Plan, Task, TaskId};
use foreman::orchestration::{AttemptOutcome, RunOutcome};
use foreman::registry::RoleRegistry;

use crate::fixtures::{
    flat_profile, registry_for, roles_with_cap, run_plan, statuses, FakeWorker, WorkerBehavior,
};

fn config() -> Config {
    let mut config = Config::default();
    config.tool_timeout_secs = 5;
    config.cancel_grace_secs = 1;
    config
}

#[tokio::test]
async fn circuit_breaker_records_exactly_the_cap() {
    let looper = FakeWorker::new("looper", WorkerBehavior::LoopForever);
    let plan = Plan::new(
        "single step",
        1,
        vec![Task::new("t1", "coder", "Write /tmp/out.txt")],
    );
    let harness = run_plan(
        plan,
        vec![looper],
        registry_for(vec![flat_profile("looper", 90.0)]),
        roles_with_cap("coder", 5),
        config(),
        CancellationToken::new(),
    )
    .await;

    let statuses = statuses(&harness.report);
    assert_eq!(statuses["t1"], "failed: iteration_limit_exceeded");
    let execution = &harness.report.executions[&TaskId::new("t1")];
    assert_eq!(execution.attempts.len(), 1);
    assert_eq!(execution.attempts[0].iterations, 5);
    assert_eq!(execution.attempts[0].outcome, AttemptOutcome::IterationLimit);
}

#[tokio::test]
async fn degraded_default_worker_handles_roles_nobody_qualifies_for() {
    let weak = FakeWorker::new("weak", WorkerBehavior::Fail);
    let safety = FakeWorker::new("safety-net", WorkerBehavior::SucceedAfter(0));
    let plan = Plan::new(
        "single step",
        1,
        vec![Task::new("t1", "coder", "Write /tmp/out.txt")],
    );
    let mut roles = RoleRegistry::default();
    roles.insert(
        "coder",
        foreman::registry::RoleProfile {
            requirement: foreman::registry::RoleRequirement {
                min_score: 99.0,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    let mut config = config();
    config.default_worker = Some("safety-net".to_string());

    let harness = run_plan(
        plan,
        vec![weak.clone(), safety.clone()],
        registry_for(vec![flat_profile("weak", 50.0), flat_profile("safety-net", 10.0)]),
        roles,
        config,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::Success);
    let execution = &harness.report.executions[&TaskId::new("t1")];
    assert_eq!(execution.chosen_worker.as_deref(), Some("safety-net"));
    assert_eq!(weak.invocation_count(), 0);
}

#[tokio::test]
async fn cancellation_fails_running_and_skips_waiting() {
    let slow = FakeWorker::new("m1", WorkerBehavior::SlowSucceed(Duration::from_secs(30)));
    let plan = Plan::new(
        "long chain",
        1,
        vec![
            Task::new("t1", "coder", "Write /tmp/a.txt"),
            Task::new("t2", "coder", "Write /tmp/b.txt").depends_on("t1"),
        ],
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let harness = run_plan(
        plan,
        vec![slow],
        registry_for(vec![flat_profile("m1", 90.0)]),
        RoleRegistry::default(),
        config(),
        cancel,
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::Cancelled);
    let statuses = statuses(&harness.report);
    assert_eq!(statuses["t1"], "failed: cancelled");
    assert_eq!(statuses["t2"], "skipped: run_cancelled");
}

#[tokio::test]
async fn cancellation_preserves_already_recorded_results() {
    let fast = FakeWorker::new("m1", WorkerBehavior::SucceedAfter(0));
    let slow = FakeWorker::new("m2", WorkerBehavior::SlowSucceed(Duration::from_secs(30)));
    let plan = Plan::new(
        "fast then slow",
        1,
        vec![
            Task::new("quick", "scout", "Write /tmp/quick.txt"),
            Task::new("slow", "digger", "Write /tmp/slow.txt").depends_on("quick"),
            Task::new("later", "digger", "Write /tmp/later.txt").depends_on("slow"),
        ],
    );
    // Only m1 clears the scout bar; only m2 has the digging strength.
    let m2_profile = foreman::registry::WorkerProfile {
        id: "m2".to_string(),
        overall_score: 85.0,
        tier_scores: [(1u8, 85.0), (2, 85.0), (3, 85.0)].into_iter().collect(),
        dimension_scores: [("digging".to_string(), 90.0), ("planning".to_string(), 85.0)]
            .into_iter()
            .collect(),
    };
    let registry = registry_for(vec![flat_profile("m1", 90.0), m2_profile]);
    let mut roles = RoleRegistry::default();
    roles.insert(
        "scout",
        foreman::registry::RoleProfile {
            requirement: foreman::registry::RoleRequirement {
                min_score: 88.0,
                ..Default::default()
            },
            ..Default::default()
        },
    );
    roles.insert(
        "digger",
        foreman::registry::RoleProfile {
            requirement: foreman::registry::RoleRequirement {
                critical_dimensions: ["digging".to_string()].into_iter().collect(),
                ..Default::default()
            },
            ..Default::default()
        },
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let harness = run_plan(
        plan,
        vec![fast, slow],
        registry,
        roles,
        config(),
        cancel,
    )
    .await;

    assert_eq!(harness.report.outcome, RunOutcome::Cancelled);
    let statuses = statuses(&harness.report);
    // The fast task finished before cancellation and keeps its result.
    assert_eq!(statuses["quick"], "succeeded");
    assert_eq!(statuses["slow"], "failed: cancelled");
    assert_eq!(statuses["later"], "skipped: run_cancelled");
}

#[tokio::test]
async fn report_covers_every_task_exactly_once() {
    let worker = FakeWorker::new("m1", WorkerBehavior::SucceedAfter(1));
    let harness = run_plan(
        crate::fixtures::diamond_plan(),
        vec![worker],
        registry_for(vec![flat_profile("m1", 90.0)]),
        RoleRegistry::default(),
        config(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(harness.report.executions.len(), 4);
    for id in ["setup", "compile", "docs", "package"] {
        assert!(harness.report.executions.contains_key(&TaskId::new(id)));
    }

    // Round-trips through JSON intact.
    let dir = tempfile::tempdir().unwrap();
    let path = harness.report.save(dir.path()).unwrap();
    let loaded = foreman::orchestration::ExecutionReport::load(&path).unwrap();
    assert_eq!(loaded.run_id, harness.report.run_id);
    assert_eq!(loaded.executions.len(), 4);
}
