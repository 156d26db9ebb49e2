//! Append-only timeline of run events.
//!
//! When timeline recording is enabled, the executor appends a
//! [`TimelineEvent`] for every notable moment of a run: tasks starting and
//! finishing, level barriers, strategy switches, goal satisfaction.
//! Timestamps are offsets from run start, so the returned log stands on
//! its own.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::types::TaskId;

/// What kind of moment an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    /// The run began.
    RunStarted,
    /// A task was dispatched.
    TaskStarted,
    /// A task completed successfully.
    TaskCompleted,
    /// A task failed, timed out, or panicked.
    TaskFailed,
    /// A task was skipped without running.
    TaskSkipped,
    /// A dependency level began.
    LevelStarted,
    /// A dependency level reached its barrier.
    LevelCompleted,
    /// The adaptive strategy switched modes.
    StrategySwitched,
    /// Goal criteria were satisfied and the run halted early.
    GoalSatisfied,
    /// The run was cancelled.
    RunCancelled,
    /// The run finished.
    RunCompleted,
}

/// One entry in the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// The kind of moment recorded.
    pub kind: TimelineEventKind,
    /// Offset from run start. Stamped when the event is recorded.
    pub at: Duration,
    /// The task involved, if any.
    pub task_id: Option<TaskId>,
    /// Free-form details (error text, switch direction, level number).
    pub details: Option<String>,
}

impl TimelineEvent {
    fn new(kind: TimelineEventKind, task_id: Option<TaskId>, details: Option<String>) -> Self {
        Self {
            kind,
            at: Duration::ZERO,
            task_id,
            details,
        }
    }

    /// Create a RunStarted event.
    pub fn run_started() -> Self {
        Self::new(TimelineEventKind::RunStarted, None, None)
    }

    /// Create a TaskStarted event.
    pub fn task_started(task_id: TaskId) -> Self {
        Self::new(TimelineEventKind::TaskStarted, Some(task_id), None)
    }

    /// Create a TaskCompleted event.
    pub fn task_completed(task_id: TaskId) -> Self {
        Self::new(TimelineEventKind::TaskCompleted, Some(task_id), None)
    }

    /// Create a TaskFailed event carrying the error text.
    pub fn task_failed(task_id: TaskId, error: impl Into<String>) -> Self {
        Self::new(TimelineEventKind::TaskFailed, Some(task_id), Some(error.into()))
    }

    /// Create a TaskSkipped event.
    pub fn task_skipped(task_id: TaskId) -> Self {
        Self::new(TimelineEventKind::TaskSkipped, Some(task_id), None)
    }

    /// Create a LevelStarted event.
    pub fn level_started(depth: usize, size: usize) -> Self {
        Self::new(
            TimelineEventKind::LevelStarted,
            None,
            Some(format!("level {depth} ({size} tasks)")),
        )
    }

    /// Create a LevelCompleted event.
    pub fn level_completed(depth: usize) -> Self {
        Self::new(
            TimelineEventKind::LevelCompleted,
            None,
            Some(format!("level {depth}")),
        )
    }

    /// Create a StrategySwitched event.
    pub fn strategy_switched(from: &str, to: &str, efficiency: f64) -> Self {
        Self::new(
            TimelineEventKind::StrategySwitched,
            None,
            Some(format!("{from} → {to} (efficiency {efficiency:.2})")),
        )
    }

    /// Create a GoalSatisfied event.
    pub fn goal_satisfied(completed: usize) -> Self {
        Self::new(
            TimelineEventKind::GoalSatisfied,
            None,
            Some(format!("after {completed} completed tasks")),
        )
    }

    /// Create a RunCancelled event.
    pub fn run_cancelled() -> Self {
        Self::new(TimelineEventKind::RunCancelled, None, None)
    }

    /// Create a RunCompleted event.
    pub fn run_completed(success: bool) -> Self {
        Self::new(
            TimelineEventKind::RunCompleted,
            None,
            Some(format!("success: {success}")),
        )
    }
}

/// Recorder for a single run's events.
///
/// Cheap no-op when disabled. Recording locks briefly; events are stamped
/// with their offset from run start at the moment they are recorded.
pub struct Timeline {
    enabled: bool,
    start: Instant,
    events: Mutex<Vec<TimelineEvent>>,
}

impl Timeline {
    /// Create a timeline. When `enabled` is false, records are dropped.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            start: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Whether recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an event, stamping its offset from run start.
    pub fn record(&self, mut event: TimelineEvent) {
        if !self.enabled {
            return;
        }
        event.at = self.start.elapsed();
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether any events have been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the timeline and return the ordered event log.
    pub fn into_events(self) -> Vec<TimelineEvent> {
        self.events.into_inner().unwrap_or_default()
    }
}
