//! Cancellation behavior tests.

use std::time::{Duration, Instant};

use strategos::testing::SleepAction;
use strategos::{
    Executor, ExecutorConfig, PlanBuilder, RunError, StrategyKind, Task, TaskId, TaskStatus,
    TimelineEventKind,
};

fn slow_plan() -> strategos::Plan {
    PlanBuilder::new("slow", "long-running work")
        .add_task(Task::new("s1", SleepAction::new(Duration::from_secs(5))))
        .add_task(Task::new("s2", SleepAction::new(Duration::from_secs(5))))
        .add_task_with_deps(Task::new("after", SleepAction::new(Duration::from_millis(5))), &["s1"])
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_cancel_mid_run_stops_promptly() {
    let executor = Executor::new(
        ExecutorConfig::new()
            .with_strategy(StrategyKind::Parallel)
            .with_task_timeout(Duration::from_secs(30)),
    )
    .unwrap();

    let token = executor.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let start = Instant::now();
    let result = executor.run(slow_plan()).await.unwrap();

    // Cancel-aware actions stop well before their 5s sleep finishes.
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "cancellation took {:?}",
        start.elapsed()
    );
    assert!(!result.success);
    assert!(matches!(result.error, Some(RunError::Cancelled)));
    assert!(result
        .timeline
        .iter()
        .any(|e| e.kind == TimelineEventKind::RunCancelled));
}

#[tokio::test]
async fn test_cancelled_run_leaves_no_pending_tasks() {
    let executor = Executor::new(
        ExecutorConfig::new()
            .with_strategy(StrategyKind::Parallel)
            .with_task_timeout(Duration::from_secs(30)),
    )
    .unwrap();

    let token = executor.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let result = executor.run(slow_plan()).await.unwrap();

    // Every task reaches a terminal state; nothing is left pending or
    // running. The never-dispatched dependent is skipped.
    for (id, status) in &result.statuses {
        assert!(status.is_terminal(), "{id} left in {status}");
    }
    assert_eq!(result.status(&TaskId::new("after")), Some(TaskStatus::Skipped));
}

#[tokio::test]
async fn test_cancel_before_run_skips_everything() {
    let executor = Executor::new(
        ExecutorConfig::new().with_strategy(StrategyKind::Sequential),
    )
    .unwrap();
    executor.cancellation_token().cancel();

    let result = executor.run(slow_plan()).await.unwrap();

    assert!(!result.success);
    assert!(matches!(result.error, Some(RunError::Cancelled)));
    for id in ["s1", "s2", "after"] {
        assert_eq!(
            result.status(&TaskId::new(id)),
            Some(TaskStatus::Skipped),
            "{id} should never have started"
        );
    }
    assert_eq!(result.metrics.completed, 0);
}
