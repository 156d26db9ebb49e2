//! Plan execution.
//!
//! The [`Executor`] drives a validated [`Plan`] to completion: it picks the
//! strategy, owns the worker pool for the run, checks goal criteria as
//! results accumulate, and assembles the final [`PlanResult`]. One executor
//! can run many plans; each run gets a fresh pool, tracker, and timeline.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::config::{ConfigError, ExecutorConfig, StrategyKind};
use crate::core::goal::{GoalChecker, GoalState};
use crate::core::graph::{level_groups, GraphError};
use crate::core::plan::{Plan, TaskOutcome};
use crate::core::types::{PlanId, RunId, TaskId, TaskStatus};
use crate::timeline::{Timeline, TimelineEvent};

use super::adaptive::{AdaptiveController, Mode};
use super::metrics::{ExecutionMetrics, PerformanceTracker};
use super::pool::WorkerPool;
use super::strategy::{RunState, StrategyCtx};

/// The failure that terminated a run.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    /// A task's action returned an error.
    #[error("task '{task}' failed: {message}")]
    Task { task: TaskId, message: String },

    /// A task exceeded the per-task deadline.
    #[error("task '{task}' timed out after {timeout:?}")]
    Timeout { task: TaskId, timeout: Duration },

    /// A task's action panicked.
    #[error("task '{task}' panicked: {message}")]
    Panic { task: TaskId, message: String },

    /// The run was cancelled from outside.
    #[error("run cancelled")]
    Cancelled,
}

/// Everything a caller learns from one run.
#[derive(Debug)]
pub struct PlanResult {
    /// The plan that ran.
    pub plan_id: PlanId,
    /// Unique id of this run.
    pub run_id: RunId,
    /// Whether the run succeeded: the goal was satisfied, or every
    /// scheduled task finished without a terminating failure.
    pub success: bool,
    /// Final goal criteria with their satisfied flags.
    pub goal: GoalState,
    /// Per-task outcome for every task that reached a terminal state.
    pub outcomes: HashMap<TaskId, TaskOutcome>,
    /// Terminal status of every task in the plan.
    pub statuses: HashMap<TaskId, TaskStatus>,
    /// Performance metrics for the run.
    pub metrics: ExecutionMetrics,
    /// Ordered event log; empty when timeline recording is disabled.
    pub timeline: Vec<TimelineEvent>,
    /// First terminating failure, if the run had one.
    pub error: Option<RunError>,
}

impl PlanResult {
    /// Outcome of one task by id.
    pub fn outcome(&self, id: &TaskId) -> Option<&TaskOutcome> {
        self.outcomes.get(id)
    }

    /// Terminal status of one task by id.
    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.statuses.get(id).copied()
    }
}

/// Executes plans against a validated configuration.
pub struct Executor {
    config: ExecutorConfig,
    cancel: CancellationToken,
}

impl Executor {
    /// Create an executor, validating the configuration up front.
    pub fn new(config: ExecutorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// The executor's configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Token that cancels every run driven by this executor.
    ///
    /// Cancelling stops dispatch promptly; tasks already running are asked
    /// to stop through their action context and the run reports
    /// [`RunError::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a plan to completion, early goal satisfaction, failure, or
    /// cancellation.
    ///
    /// Fails with [`GraphError`] only when the plan's graph is invalid;
    /// every runtime failure is reported inside the returned [`PlanResult`].
    pub async fn run(&self, plan: Plan) -> Result<PlanResult, GraphError> {
        let run_id = RunId::new();
        let span = info_span!("run", plan = %plan.id(), run = %run_id);
        self.run_inner(plan, run_id).instrument(span).await
    }

    async fn run_inner(&self, plan: Plan, run_id: RunId) -> Result<PlanResult, GraphError> {
        let strategy = plan.strategy().unwrap_or(self.config.strategy);
        plan.graph().validate()?;
        let deps = plan.graph().resolved_dependencies()?;
        let order = plan.graph().kahn_order(&deps)?;
        let levels = level_groups(&deps, &order);

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); deps.len()];
        for (task, row) in deps.iter().enumerate() {
            for &dep in row {
                dependents[dep].push(task);
            }
        }

        let (plan_id, graph, mut goal, _metadata) = plan.into_parts();
        info!(
            strategy = ?strategy,
            tasks = graph.len(),
            levels = levels.len(),
            "starting run"
        );

        let started = Instant::now();
        let timeline = Timeline::new(self.config.enable_timeline);
        timeline.record(TimelineEvent::run_started());

        let tracker = PerformanceTracker::new(self.config.max_parallel);
        let cancel = self.cancel.clone();
        let pool = WorkerPool::new(self.config.max_parallel, cancel.clone());
        let checker = GoalChecker::new(self.config.goal_combinator);

        let ctx = StrategyCtx {
            graph: &graph,
            dependents: &dependents,
            pool: &pool,
            config: &self.config,
            tracker: &tracker,
            timeline: &timeline,
            cancel: &cancel,
            run_id,
        };

        let mut state = RunState::new(graph.len());
        let mut checks_done = 0usize;
        let mut goal_satisfied = false;

        match strategy {
            StrategyKind::Sequential => {
                for &idx in &order {
                    if state.halted || cancel.is_cancelled() {
                        break;
                    }
                    if state.statuses[idx] != TaskStatus::Pending {
                        continue;
                    }
                    ctx.run_task(&mut state, idx).await;
                    if self.goal_due(&state, &mut checks_done)
                        && checker.evaluate(&mut goal, &state.view)
                    {
                        goal_satisfied = true;
                        break;
                    }
                }
            }
            StrategyKind::Parallel => {
                for (depth, level) in levels.iter().enumerate() {
                    if state.halted || cancel.is_cancelled() {
                        break;
                    }
                    timeline.record(TimelineEvent::level_started(depth, level.len()));
                    ctx.run_level_parallel(&mut state, level).await;
                    timeline.record(TimelineEvent::level_completed(depth));
                    if self.goal_due(&state, &mut checks_done)
                        && checker.evaluate(&mut goal, &state.view)
                    {
                        goal_satisfied = true;
                        break;
                    }
                }
            }
            StrategyKind::Adaptive => {
                let mut controller = AdaptiveController::new(
                    self.config.adaptive_threshold,
                    self.config.max_parallel,
                );
                for (depth, level) in levels.iter().enumerate() {
                    if state.halted || cancel.is_cancelled() {
                        break;
                    }
                    timeline.record(TimelineEvent::level_started(depth, level.len()));
                    match controller.decide(level.len(), &tracker, &timeline) {
                        Mode::Sequential => ctx.run_level_sequential(&mut state, level).await,
                        Mode::Parallel => ctx.run_level_parallel(&mut state, level).await,
                    }
                    timeline.record(TimelineEvent::level_completed(depth));
                    if self.goal_due(&state, &mut checks_done)
                        && checker.evaluate(&mut goal, &state.view)
                    {
                        goal_satisfied = true;
                        break;
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            state.record_failure(RunError::Cancelled);
            timeline.record(TimelineEvent::run_cancelled());
        }

        if goal_satisfied {
            timeline.record(TimelineEvent::goal_satisfied(state.completed));
        } else if state.first_error.is_none() {
            // Every task finished; leave the criteria flags reflecting the
            // final aggregated view.
            goal_satisfied = checker.evaluate(&mut goal, &state.view);
        }

        state.skip_all_pending(&graph, &timeline);
        pool.shutdown().await;

        let success = state.first_error.is_none() || goal_satisfied;
        timeline.record(TimelineEvent::run_completed(success));

        let metrics = tracker.snapshot(state.skipped(), started.elapsed());
        info!(
            success,
            completed = metrics.completed,
            failed = metrics.failed,
            skipped = metrics.skipped,
            "run finished"
        );

        let mut outcomes = HashMap::with_capacity(graph.len());
        let mut statuses = HashMap::with_capacity(graph.len());
        for (idx, outcome) in state.outcomes.into_iter().enumerate() {
            let id = graph.task(idx).id().clone();
            statuses.insert(id.clone(), state.statuses[idx]);
            if let Some(outcome) = outcome {
                outcomes.insert(id, outcome);
            }
        }

        Ok(PlanResult {
            plan_id,
            run_id,
            success,
            goal,
            outcomes,
            statuses,
            metrics,
            timeline: timeline.into_events(),
            error: state.first_error,
        })
    }

    /// Whether enough tasks completed since the last goal check.
    fn goal_due(&self, state: &RunState, checks_done: &mut usize) -> bool {
        let due = state.completed / self.config.goal_check_interval;
        if due > *checks_done {
            *checks_done = due;
            true
        } else {
            false
        }
    }
}
