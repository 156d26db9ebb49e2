//! Level runners and shared run bookkeeping.
//!
//! Both execution strategies funnel through the same primitives: a
//! [`RunState`] that owns every task's status and outcome for the run, and
//! two level runners, one that executes a single task at a time and one
//! that submits a whole dependency level to the pool behind a strict
//! barrier. The executor composes these with goal checks; the adaptive
//! controller picks between them per level.

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::debug;

use tokio_util::sync::CancellationToken;

use crate::config::{ErrorPolicy, ExecutorConfig};
use crate::core::goal::merge_payload;
use crate::core::graph::TaskGraph;
use crate::core::plan::TaskOutcome;
use crate::core::task::{ActionContext, ActionError};
use crate::core::types::{RunId, TaskStatus};
use crate::timeline::{Timeline, TimelineEvent};

use super::executor::RunError;
use super::metrics::PerformanceTracker;
use super::pool::{PoolError, PoolHandle, WorkerPool};

/// Mutable state of one run, owned by the executor's control loop.
///
/// Workers never touch this; results come back through pool handles and
/// are applied here by the control loop, so every status and outcome is
/// written exactly once.
pub(crate) struct RunState {
    pub statuses: Vec<TaskStatus>,
    pub outcomes: Vec<Option<TaskOutcome>>,
    /// Aggregated view of completed object payloads, for goal checks.
    pub view: Map<String, Value>,
    /// Count of tasks that completed successfully.
    pub completed: usize,
    /// First terminating failure of the run.
    pub first_error: Option<RunError>,
    /// Set when the failure policy or cancellation stops further dispatch.
    pub halted: bool,
}

impl RunState {
    pub fn new(task_count: usize) -> Self {
        Self {
            statuses: vec![TaskStatus::Pending; task_count],
            outcomes: vec![None; task_count],
            view: Map::new(),
            completed: 0,
            first_error: None,
            halted: false,
        }
    }

    fn transition(&mut self, idx: usize, next: TaskStatus) {
        debug_assert!(
            self.statuses[idx].can_transition_to(next),
            "illegal status transition {} → {}",
            self.statuses[idx],
            next
        );
        self.statuses[idx] = next;
    }

    pub fn record_failure(&mut self, error: RunError) {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    /// Mark one pending task skipped.
    pub fn skip(&mut self, idx: usize, graph: &TaskGraph, timeline: &Timeline) {
        if self.statuses[idx] != TaskStatus::Pending {
            return;
        }
        let id = graph.task(idx).id().clone();
        self.transition(idx, TaskStatus::Skipped);
        self.outcomes[idx] = Some(TaskOutcome::skipped(id.clone()));
        timeline.record(TimelineEvent::task_skipped(id));
    }

    /// Mark every transitive dependent of `idx` skipped.
    pub fn skip_dependents(
        &mut self,
        idx: usize,
        dependents: &[Vec<usize>],
        graph: &TaskGraph,
        timeline: &Timeline,
    ) {
        let mut queue = dependents[idx].clone();
        while let Some(next) = queue.pop() {
            if self.statuses[next] == TaskStatus::Pending {
                self.skip(next, graph, timeline);
                queue.extend_from_slice(&dependents[next]);
            }
        }
    }

    /// Mark every still-pending task skipped.
    pub fn skip_all_pending(&mut self, graph: &TaskGraph, timeline: &Timeline) {
        for idx in 0..self.statuses.len() {
            self.skip(idx, graph, timeline);
        }
    }

    /// Count of tasks in a terminal failed state.
    pub fn failed(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| **s == TaskStatus::Failed)
            .count()
    }

    /// Count of skipped tasks.
    pub fn skipped(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| **s == TaskStatus::Skipped)
            .count()
    }
}

/// Everything the level runners need for one run, borrowed from the
/// executor.
pub(crate) struct StrategyCtx<'a> {
    pub graph: &'a TaskGraph,
    pub dependents: &'a [Vec<usize>],
    pub pool: &'a WorkerPool,
    pub config: &'a ExecutorConfig,
    pub tracker: &'a PerformanceTracker,
    pub timeline: &'a Timeline,
    pub cancel: &'a CancellationToken,
    pub run_id: RunId,
}

/// Output of one submitted unit: the action's result and the duration the
/// unit measured for itself on the worker.
type UnitOutput = (Result<Value, ActionError>, Duration);

type ActionHandle = PoolHandle<UnitOutput>;

impl StrategyCtx<'_> {
    /// Submit one task to the pool and mark it running.
    async fn dispatch(&self, state: &mut RunState, idx: usize) -> Result<ActionHandle, RunError> {
        let task = self.graph.task(idx);
        let id = task.id().clone();
        let action = task.action();
        let ctx = ActionContext::new(
            id.clone(),
            self.run_id,
            self.config.max_retries,
            self.cancel.child_token(),
        );

        // The unit times itself; handles may be joined long after the work
        // finished and must not charge the task for the wait.
        let handle = self
            .pool
            .submit(
                async move {
                    let started = Instant::now();
                    let result = action.run(&ctx).await;
                    (result, started.elapsed())
                },
                self.config.task_timeout,
            )
            .await
            .map_err(|err| match err {
                PoolError::Cancelled | PoolError::Closed => RunError::Cancelled,
                PoolError::Timeout(timeout) => RunError::Timeout {
                    task: id.clone(),
                    timeout,
                },
                PoolError::Panicked(message) => RunError::Panic {
                    task: id.clone(),
                    message,
                },
            })?;

        debug!(task = %task.id(), "dispatching task");
        state.transition(idx, TaskStatus::Running);
        self.timeline
            .record(TimelineEvent::task_started(task.id().clone()));
        Ok(handle)
    }

    /// Apply a joined pool result to the run state. Returns whether the
    /// task succeeded and the duration charged to it.
    ///
    /// Units that ran report their own clock. A unit the pool never heard
    /// back from is charged its deadline (timeout) or the wall time since
    /// dispatch (panic, drain).
    fn settle(
        &self,
        state: &mut RunState,
        idx: usize,
        joined: Result<UnitOutput, PoolError>,
        dispatched: Instant,
    ) -> (bool, Duration) {
        let id = self.graph.task(idx).id().clone();

        let (error, duration) = match joined {
            Ok((Ok(payload), duration)) => {
                state.transition(idx, TaskStatus::Completed);
                merge_payload(&mut state.view, &payload);
                state.outcomes[idx] =
                    Some(TaskOutcome::completed(id.clone(), payload, duration));
                state.completed += 1;
                self.tracker.record_task(duration, true);
                self.timeline.record(TimelineEvent::task_completed(id));
                return (true, duration);
            }
            Ok((Err(ActionError::Cancelled), duration)) => (RunError::Cancelled, duration),
            Ok((Err(err), duration)) => (
                RunError::Task {
                    task: id.clone(),
                    message: err.to_string(),
                },
                duration,
            ),
            Err(PoolError::Timeout(timeout)) => (
                RunError::Timeout {
                    task: id.clone(),
                    timeout,
                },
                timeout,
            ),
            Err(PoolError::Panicked(message)) => (
                RunError::Panic {
                    task: id.clone(),
                    message,
                },
                dispatched.elapsed(),
            ),
            Err(PoolError::Closed | PoolError::Cancelled) => {
                (RunError::Cancelled, dispatched.elapsed())
            }
        };

        let message = error.to_string();
        state.transition(idx, TaskStatus::Failed);
        state.outcomes[idx] = Some(TaskOutcome::failed(id.clone(), message.clone(), duration));
        self.tracker.record_task(duration, false);
        self.timeline.record(TimelineEvent::task_failed(id, message));
        state.record_failure(error);
        (false, duration)
    }

    /// React to a failed task per the configured error policy.
    ///
    /// Dependents of the failed task are always skipped; abort-all
    /// additionally halts dispatch so the executor skips everything else.
    fn apply_failure_policy(&self, state: &mut RunState, idx: usize) {
        state.skip_dependents(idx, self.dependents, self.graph, self.timeline);
        if self.config.error_policy == ErrorPolicy::AbortAll {
            state.halted = true;
        }
    }

    /// Run a single task to a terminal state. Returns true on success.
    pub async fn run_task(&self, state: &mut RunState, idx: usize) -> bool {
        let started = Instant::now();
        let handle = match self.dispatch(state, idx).await {
            Ok(handle) => handle,
            Err(error) => {
                // Dispatch was refused (cancellation or drain); the task
                // never ran.
                state.record_failure(error);
                state.halted = true;
                state.skip(idx, self.graph, self.timeline);
                return false;
            }
        };

        let joined = handle.join().await;
        let (success, _) = self.settle(state, idx, joined, started);
        if !success {
            self.apply_failure_policy(state, idx);
        }
        success
    }

    /// Run one dependency level with tasks one at a time, in insertion
    /// order. Stops early once the run halts.
    pub async fn run_level_sequential(&self, state: &mut RunState, level: &[usize]) {
        for &idx in level {
            if state.halted || self.cancel.is_cancelled() {
                break;
            }
            if state.statuses[idx] != TaskStatus::Pending {
                continue;
            }
            self.run_task(state, idx).await;
        }
    }

    /// Run one dependency level with every task submitted concurrently.
    ///
    /// The whole level reaches a terminal state before this returns: a
    /// strict barrier. A failure inside the level does not stop its
    /// siblings; the failure policy is applied only after the barrier.
    pub async fn run_level_parallel(&self, state: &mut RunState, level: &[usize]) {
        let level_started = Instant::now();
        let mut submitted: Vec<(usize, ActionHandle, Instant)> = Vec::with_capacity(level.len());

        for &idx in level {
            if state.statuses[idx] != TaskStatus::Pending {
                continue;
            }
            let dispatched = Instant::now();
            match self.dispatch(state, idx).await {
                Ok(handle) => submitted.push((idx, handle, dispatched)),
                Err(error) => {
                    state.record_failure(error);
                    state.halted = true;
                    state.skip(idx, self.graph, self.timeline);
                    // Stop submitting, but still join what is in flight.
                    break;
                }
            }
        }

        let mut failed_indices = Vec::new();
        let mut busy = Duration::ZERO;
        let submitted_count = submitted.len();

        // Join in submission order; results stay indexed by submission.
        // Each unit carries the duration it measured for itself, so a slow
        // sibling joined first cannot inflate a fast task's charge.
        for (idx, handle, dispatched) in submitted {
            let joined = handle.join().await;
            let (success, duration) = self.settle(state, idx, joined, dispatched);
            busy += duration;
            if !success {
                failed_indices.push(idx);
            }
        }

        // Barrier reached; only now does failure affect anything outside
        // the level.
        for idx in failed_indices {
            self.apply_failure_policy(state, idx);
        }

        self.tracker
            .record_level(level_started.elapsed(), busy, submitted_count);
    }
}
