//! Strategy behavior tests.
//!
//! Sequential ordering, parallel level execution, panic containment, and
//! adaptive mode switching.

use std::time::{Duration, Instant};

use serde_json::json;
use strategos::testing::{ConcurrencyGauge, EmitAction, PanicAction, SleepAction, TestHarness};
use strategos::{
    PlanBuilder, RunError, StrategyKind, Task, TaskId, TaskStatus, TimelineEventKind,
};

use crate::common::{chain_plan, completion_order, diamond_plan};

#[tokio::test]
async fn test_sequential_chain_runs_in_dependency_order() {
    let harness = TestHarness::new().with_strategy(StrategyKind::Sequential);
    let plan = chain_plan(&["first", "second", "third"], Duration::from_millis(10));

    let result = harness.execute_and_assert_success(plan).await;

    let order = completion_order(&result.timeline);
    assert_eq!(
        order,
        vec![
            TaskId::new("first"),
            TaskId::new("second"),
            TaskId::new("third"),
        ]
    );
    assert_eq!(result.metrics.completed, 3);
}

#[tokio::test]
async fn test_sequential_never_overlaps_tasks() {
    let gauge = ConcurrencyGauge::new();
    let mut builder = PlanBuilder::new("wide", "independent tasks");
    for i in 0..8 {
        builder = builder.add_task(Task::new(
            format!("t{i}"),
            gauge.action(Duration::from_millis(5)),
        ));
    }
    let plan = builder.build().unwrap();

    let harness = TestHarness::new()
        .with_strategy(StrategyKind::Sequential)
        .with_max_parallel(8);
    harness.execute_and_assert_success(plan).await;

    assert_eq!(gauge.peak(), 1, "sequential must run one task at a time");
}

#[tokio::test]
async fn test_parallel_diamond_overlaps_the_middle_level() {
    let gauge = ConcurrencyGauge::new();
    let plan = PlanBuilder::new("diamond", "gauged diamond")
        .add_task(Task::new("a", EmitAction::empty()))
        .add_task_with_deps(Task::new("b", gauge.action(Duration::from_millis(60))), &["a"])
        .add_task_with_deps(Task::new("c", gauge.action(Duration::from_millis(60))), &["a"])
        .add_task_with_deps(Task::new("d", EmitAction::empty()), &["b", "c"])
        .build()
        .unwrap();

    let harness = TestHarness::new()
        .with_strategy(StrategyKind::Parallel)
        .with_max_parallel(2);
    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(gauge.peak(), 2, "b and c share a level and should overlap");
    assert_eq!(result.metrics.completed, 4);
}

#[tokio::test]
async fn test_parallel_is_faster_than_the_serial_sum() {
    // Middle level of the diamond runs two 80ms tasks at once; a serial
    // execution would need at least 240ms in the middle plus the ends.
    let plan = diamond_plan(
        Duration::from_millis(20),
        Duration::from_millis(80),
        Duration::from_millis(20),
    );

    let harness = TestHarness::new()
        .with_strategy(StrategyKind::Parallel)
        .with_max_parallel(2);
    let start = Instant::now();
    harness.execute_and_assert_success(plan).await;

    // Generous bound: well under the 200ms serial sum.
    assert!(
        start.elapsed() < Duration::from_millis(180),
        "parallel diamond took {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_panic_is_contained_to_its_task() {
    let plan = PlanBuilder::new("panic", "panic containment")
        .add_task(Task::new("explodes", PanicAction::new("boom")))
        .add_task(Task::new("sibling", EmitAction::new(json!({ "ok": true }))))
        .add_task_with_deps(Task::new("downstream", EmitAction::empty()), &["explodes"])
        .build()
        .unwrap();

    let harness = TestHarness::new().with_strategy(StrategyKind::Parallel);
    let result = harness.execute_and_assert_failure(plan).await;

    match result.error {
        Some(RunError::Panic { ref task, ref message }) => {
            assert_eq!(task.as_str(), "explodes");
            assert!(message.contains("boom"));
        }
        ref other => panic!("expected Panic, got {other:?}"),
    }
    // The sibling shares the level and completes before the barrier.
    assert_eq!(
        result.status(&TaskId::new("sibling")),
        Some(TaskStatus::Completed)
    );
    assert_eq!(
        result.status(&TaskId::new("downstream")),
        Some(TaskStatus::Skipped)
    );
}

#[tokio::test]
async fn test_sequential_and_parallel_agree_on_results() {
    for strategy in [StrategyKind::Sequential, StrategyKind::Parallel] {
        let plan = diamond_plan(
            Duration::from_millis(5),
            Duration::from_millis(5),
            Duration::from_millis(5),
        );
        let harness = TestHarness::new().with_strategy(strategy);

        let result = harness.execute_and_assert_success(plan).await;

        for id in ["a", "b", "c", "d"] {
            assert_eq!(
                result.status(&TaskId::new(id)),
                Some(TaskStatus::Completed),
                "{id} under {strategy:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_strategies_agree_on_failure_fallout_under_skip_dependents() {
    let build = || {
        PlanBuilder::new("fallout", "failing branch")
            .add_task(Task::new("bad", strategos::testing::FailAction::new("deliberate")))
            .add_task_with_deps(Task::new("blocked", EmitAction::empty()), &["bad"])
            .add_task(Task::new("free", EmitAction::empty()))
            .add_task_with_deps(Task::new("free_child", EmitAction::empty()), &["free"])
            .build()
            .unwrap()
    };

    let mut status_sets = Vec::new();
    for strategy in [StrategyKind::Sequential, StrategyKind::Parallel] {
        let harness = TestHarness::new().with_config(
            strategos::ExecutorConfig::new()
                .with_strategy(strategy)
                .with_error_policy(strategos::ErrorPolicy::SkipDependents)
                .with_task_timeout(Duration::from_secs(5)),
        );
        let result = harness.execute_and_assert_failure(build()).await;
        let mut statuses: Vec<(String, TaskStatus)> = result
            .statuses
            .iter()
            .map(|(id, status)| (id.as_str().to_string(), *status))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        status_sets.push(statuses);
    }

    assert_eq!(
        status_sets[0], status_sets[1],
        "both strategies must settle the same terminal statuses"
    );
}

#[tokio::test]
async fn test_adaptive_switches_to_parallel_on_wide_level() {
    let gauge = ConcurrencyGauge::new();
    let mut builder = PlanBuilder::new("adaptive", "narrow then wide")
        .add_task(Task::new("root", EmitAction::empty()));
    for i in 0..4 {
        builder = builder.add_task_with_deps(
            Task::new(format!("w{i}"), gauge.action(Duration::from_millis(30))),
            &["root"],
        );
    }
    let plan = builder.build().unwrap();

    let harness = TestHarness::new()
        .with_strategy(StrategyKind::Adaptive)
        .with_max_parallel(4);
    let result = harness.execute_and_assert_success(plan).await;

    assert!(
        result.metrics.strategy_switches >= 1,
        "the wide level should have triggered a switch"
    );
    assert!(
        result
            .timeline
            .iter()
            .any(|e| e.kind == TimelineEventKind::StrategySwitched),
        "switch must appear on the timeline"
    );
    assert!(gauge.peak() >= 2, "the wide level should have overlapped");
}

#[tokio::test]
async fn test_adaptive_demotes_after_poorly_utilized_level() {
    let gauge = ConcurrencyGauge::new();
    let mut builder = PlanBuilder::new("demote", "skewed level then a wide tail")
        .add_task(Task::new("root", EmitAction::empty()))
        .add_task_with_deps(
            Task::new("skew", SleepAction::new(Duration::from_millis(200))),
            &["root"],
        );
    for i in 0..3 {
        builder = builder.add_task_with_deps(
            Task::new(format!("quick{i}"), SleepAction::new(Duration::from_millis(5))),
            &["root"],
        );
    }
    for i in 0..3 {
        builder = builder.add_task_with_deps(
            Task::new(format!("tail{i}"), gauge.action(Duration::from_millis(20))),
            &["skew"],
        );
    }
    let plan = builder.build().unwrap();

    let harness = TestHarness::new()
        .with_strategy(StrategyKind::Adaptive)
        .with_max_parallel(4);
    let result = harness.execute_and_assert_success(plan).await;

    // The skewed level keeps one of four slots busy, measuring far below
    // the switching threshold; the tail level must run one at a time.
    assert_eq!(gauge.peak(), 1, "demoted level should not overlap");
    assert_eq!(
        result.metrics.strategy_switches, 2,
        "expected one promotion and one demotion"
    );
}

#[tokio::test]
async fn test_adaptive_stays_sequential_on_a_chain() {
    let harness = TestHarness::new().with_strategy(StrategyKind::Adaptive);
    let plan = chain_plan(&["a", "b", "c", "d"], Duration::from_millis(5));

    let result = harness.execute_and_assert_success(plan).await;

    assert_eq!(
        result.metrics.strategy_switches, 0,
        "singleton levels never justify parallelism"
    );
}
