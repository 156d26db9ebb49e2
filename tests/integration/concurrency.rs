//! Concurrency bound and level barrier tests.

use std::time::Duration;

use strategos::testing::{ConcurrencyGauge, SleepAction, TestHarness};
use strategos::{PlanBuilder, RunError, StrategyKind, Task, TaskId, TaskStatus};

#[tokio::test]
async fn test_parallel_respects_the_concurrency_bound() {
    let gauge = ConcurrencyGauge::new();
    let mut builder = PlanBuilder::new("bounded", "twenty independent tasks");
    for i in 0..20 {
        builder = builder.add_task(Task::new(
            format!("t{i}"),
            gauge.action(Duration::from_millis(5)),
        ));
    }
    let plan = builder.build().unwrap();

    let harness = TestHarness::new()
        .with_strategy(StrategyKind::Parallel)
        .with_max_parallel(2);
    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(result.metrics.completed, 20);
    assert_eq!(gauge.peak(), 2, "twenty tasks on two workers must peak at 2");
}

#[tokio::test]
async fn test_level_barrier_prevents_cross_level_overlap() {
    let gauge = ConcurrencyGauge::new();
    let plan = PlanBuilder::new("barrier", "two strict levels")
        .add_task(Task::new("a1", gauge.action(Duration::from_millis(30))))
        .add_task(Task::new("a2", gauge.action(Duration::from_millis(60))))
        .add_task_with_deps(Task::new("b1", gauge.action(Duration::from_millis(10))), &["a1"])
        .add_task_with_deps(Task::new("b2", gauge.action(Duration::from_millis(10))), &["a2"])
        .build()
        .unwrap();

    let harness = TestHarness::new().with_strategy(StrategyKind::Parallel);
    let result = harness.execute_and_assert_success(plan).await;

    // b1's only dependency finishes at 30ms, but the level barrier holds it
    // until a2 finishes too: every level-0 completion precedes every
    // level-1 start in the event log.
    let position = |kind: strategos::TimelineEventKind, id: &str| {
        result
            .timeline
            .iter()
            .position(|e| e.kind == kind && e.task_id == Some(TaskId::new(id)))
            .unwrap_or_else(|| panic!("no {kind:?} event for {id}"))
    };
    let a2_done = position(strategos::TimelineEventKind::TaskCompleted, "a2");
    for b in ["b1", "b2"] {
        let b_start = position(strategos::TimelineEventKind::TaskStarted, b);
        assert!(
            a2_done < b_start,
            "{b} started at event {b_start}, before the barrier at {a2_done}"
        );
    }
}

#[tokio::test]
async fn test_timeout_fails_the_task_but_not_its_siblings() {
    let plan = PlanBuilder::new("timeout", "one slow sibling")
        .add_task(Task::new("slow", SleepAction::new(Duration::from_secs(10))))
        .add_task(Task::new("quick", SleepAction::new(Duration::from_millis(5))))
        .build()
        .unwrap();

    let harness = TestHarness::new()
        .with_strategy(StrategyKind::Parallel)
        .with_task_timeout(Duration::from_millis(50));
    let result = harness.execute_and_assert_failure(plan).await;

    match result.error {
        Some(RunError::Timeout { ref task, timeout }) => {
            assert_eq!(task.as_str(), "slow");
            assert_eq!(timeout, Duration::from_millis(50));
        }
        ref other => panic!("expected Timeout, got {other:?}"),
    }
    assert_eq!(result.status(&TaskId::new("quick")), Some(TaskStatus::Completed));
    assert_eq!(result.status(&TaskId::new("slow")), Some(TaskStatus::Failed));
}

#[tokio::test]
async fn test_single_worker_parallel_degenerates_to_serial() {
    let gauge = ConcurrencyGauge::new();
    let mut builder = PlanBuilder::new("narrow", "one worker");
    for i in 0..6 {
        builder = builder.add_task(Task::new(
            format!("t{i}"),
            gauge.action(Duration::from_millis(5)),
        ));
    }
    let plan = builder.build().unwrap();

    let harness = TestHarness::new()
        .with_strategy(StrategyKind::Parallel)
        .with_max_parallel(1);
    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(result.metrics.completed, 6);
    assert_eq!(gauge.peak(), 1);
}
