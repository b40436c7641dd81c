//! Plan controller and validator working together.

use foreman::config::Config;
use foreman::core::{Plan, Task};
use foreman::orchestration::{PlanController, Validator};
use foreman::Error;

use crate::fixtures::ScriptedOracle;

fn valid_plan() -> Plan {
    Plan::new(
        "fetch then summarize",
        1,
        vec![
            Task::new("t1", "researcher", "Download https://example.com/data.csv to /tmp/data.csv"),
            Task::new("t2", "analyst", "Summarize /tmp/data.csv into /tmp/summary.md").depends_on("t1"),
        ],
    )
}

fn vague_plan() -> Plan {
    Plan::new(
        "fetch then summarize",
        1,
        vec![
            Task::new("t1", "researcher", "List files in /data/incoming"),
            Task::new("t2", "analyst", "Process each file into a summary").depends_on("t1"),
        ],
    )
}

#[tokio::test]
async fn accepted_plan_passes_revalidation() {
    let oracle = ScriptedOracle::new(vec![valid_plan()]);
    let controller = PlanController::new(oracle, Validator::baseline(), &Config::default());
    let plan = controller.propose("fetch then summarize", "").await.unwrap();

    // Idempotent: a second validation of the accepted plan is clean.
    let errors = Validator::baseline().validate(&plan, &plan.request);
    assert!(errors.is_empty());
}

#[tokio::test]
async fn oracle_sees_growing_feedback_across_rounds() {
    let oracle = ScriptedOracle::new(vec![vague_plan(), vague_plan(), valid_plan()]);
    let controller = PlanController::new(oracle, Validator::baseline(), &Config::default());
    let plan = controller.propose("fetch then summarize", "").await.unwrap();
    assert_eq!(plan.round, 3);

    let oracle = controller.into_generator();
    let feedback = oracle.feedback_seen.lock().unwrap().clone();
    assert_eq!(feedback.len(), 3);
    assert!(feedback[0].is_empty());
    assert!(!feedback[1].is_empty());
    // Round three carries both earlier rounds' errors.
    assert!(feedback[2].len() > feedback[1].len());
}

#[tokio::test]
async fn replanning_stops_after_exactly_max_rounds() {
    let oracle = ScriptedOracle::new(vec![vague_plan(), vague_plan(), vague_plan(), valid_plan()]);
    let controller = PlanController::new(oracle, Validator::baseline(), &Config::default());

    let err = controller.propose("fetch then summarize", "").await.unwrap_err();
    match err {
        Error::PlanRejected { rounds, errors } => {
            assert_eq!(rounds, 3);
            assert!(!errors.is_empty());
        }
        other => panic!("expected PlanRejected, got {:?}", other),
    }
    assert_eq!(controller.into_generator().call_count(), 3);
}
