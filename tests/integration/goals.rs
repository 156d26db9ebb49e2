//! Goal-driven early termination tests.

use serde_json::json;
use strategos::testing::{EmitAction, TestHarness};
use strategos::{
    CompareOp, GoalCombinator, GoalCriterion, GoalState, PlanBuilder, StrategyKind, Task, TaskId,
    TaskStatus, TimelineEventKind,
};

use crate::common::counting_plan;

fn count_goal(threshold: i64) -> GoalState {
    GoalState::new("count reached")
        .with_criterion(GoalCriterion::new("count", CompareOp::Ge, json!(threshold)))
}

#[tokio::test]
async fn test_goal_checked_every_interval_halts_at_the_next_boundary() {
    // 20 tasks, goal satisfied after the 7th, checked every 5 completions:
    // the check at 5 misses, the check at 10 catches it. Tasks 11..20 are
    // skipped.
    let plan = counting_plan(20)
        .with_goal_state(count_goal(7))
        .with_strategy(StrategyKind::Sequential)
        .build()
        .unwrap();

    let harness = TestHarness::new()
        .with_config(harness_config().with_goal_check_interval(5));
    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(result.metrics.completed, 10);
    assert_eq!(result.metrics.skipped, 10);
    for i in 10..20 {
        assert_eq!(
            result.status(&TaskId::new(format!("t{i}"))),
            Some(TaskStatus::Skipped),
            "t{i} should never have run"
        );
    }
}

#[tokio::test]
async fn test_goal_checked_after_every_task_halts_exactly() {
    let plan = counting_plan(20)
        .with_goal_state(count_goal(7))
        .with_strategy(StrategyKind::Sequential)
        .build()
        .unwrap();

    let harness = TestHarness::new()
        .with_config(harness_config().with_goal_check_interval(1));
    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(result.metrics.completed, 7);
    assert_eq!(result.metrics.skipped, 13);
    assert!(result
        .timeline
        .iter()
        .any(|e| e.kind == TimelineEventKind::GoalSatisfied));
}

#[tokio::test]
async fn test_all_combinator_waits_for_every_criterion() {
    let goal = GoalState::new("both present")
        .with_criterion(GoalCriterion::new("alpha", CompareOp::Eq, json!(true)))
        .with_criterion(GoalCriterion::new("beta", CompareOp::Eq, json!(true)));
    let plan = PlanBuilder::new("all", "two emitters")
        .with_goal_state(goal)
        .with_strategy(StrategyKind::Sequential)
        .add_task(Task::new("a", EmitAction::new(json!({ "alpha": true }))))
        .add_task(Task::new("b", EmitAction::new(json!({ "beta": true }))))
        .add_task(Task::new("c", EmitAction::empty()))
        .build()
        .unwrap();

    let harness = TestHarness::new()
        .with_config(harness_config().with_goal_combinator(GoalCombinator::All));
    let result = harness.execute_and_assert_success(plan).await;

    // Satisfied only once both a and b completed; c is skipped.
    assert_eq!(result.metrics.completed, 2);
    assert_eq!(result.status(&TaskId::new("c")), Some(TaskStatus::Skipped));
    assert!(result.goal.all_satisfied());
}

#[tokio::test]
async fn test_any_combinator_halts_on_the_first_satisfied_criterion() {
    let goal = GoalState::new("either present")
        .with_criterion(GoalCriterion::new("alpha", CompareOp::Eq, json!(true)))
        .with_criterion(GoalCriterion::new("beta", CompareOp::Eq, json!(true)));
    let plan = PlanBuilder::new("any", "two emitters")
        .with_goal_state(goal)
        .with_strategy(StrategyKind::Sequential)
        .add_task(Task::new("a", EmitAction::new(json!({ "alpha": true }))))
        .add_task(Task::new("b", EmitAction::new(json!({ "beta": true }))))
        .build()
        .unwrap();

    let harness = TestHarness::new()
        .with_config(harness_config().with_goal_combinator(GoalCombinator::Any));
    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(result.metrics.completed, 1);
    assert_eq!(result.status(&TaskId::new("b")), Some(TaskStatus::Skipped));
}

#[tokio::test]
async fn test_empty_criteria_never_halt_the_run() {
    let plan = counting_plan(5)
        .with_strategy(StrategyKind::Sequential)
        .build()
        .unwrap();

    let harness = TestHarness::new();
    let result = harness.execute_and_assert_success(plan).await;

    // No criteria: the run completes everything and the goal is not
    // considered satisfied.
    assert_eq!(result.metrics.completed, 5);
    assert!(!result.goal.all_satisfied());
}

#[tokio::test]
async fn test_unsatisfiable_goal_still_completes_the_plan() {
    let plan = counting_plan(5)
        .with_goal_state(count_goal(1_000))
        .with_strategy(StrategyKind::Sequential)
        .build()
        .unwrap();

    let harness = TestHarness::new();
    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(result.metrics.completed, 5);
    assert!(!result.goal.all_satisfied());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_parallel_goal_checks_happen_at_level_barriers() {
    // Two levels of emitters; the goal is satisfied by the first level, so
    // the second never starts.
    let goal = GoalState::new("first level done")
        .with_criterion(GoalCriterion::new("alpha", CompareOp::Eq, json!(1)));
    let plan = PlanBuilder::new("barrier", "two levels")
        .with_goal_state(goal)
        .add_task(Task::new("a1", EmitAction::new(json!({ "alpha": 1 }))))
        .add_task(Task::new("a2", EmitAction::empty()))
        .add_task_with_deps(Task::new("b1", EmitAction::empty()), &["a1"])
        .add_task_with_deps(Task::new("b2", EmitAction::empty()), &["a2"])
        .build()
        .unwrap();

    let harness = TestHarness::new().with_strategy(StrategyKind::Parallel);
    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(result.metrics.completed, 2);
    assert_eq!(result.status(&TaskId::new("b1")), Some(TaskStatus::Skipped));
    assert_eq!(result.status(&TaskId::new("b2")), Some(TaskStatus::Skipped));
}

fn harness_config() -> strategos::ExecutorConfig {
    strategos::ExecutorConfig::new()
        .with_strategy(StrategyKind::Sequential)
        .with_task_timeout(std::time::Duration::from_secs(5))
}
