//! Plans and their construction.
//!
//! A [`Plan`] is what a decomposer hands to the executor: a goal, the task
//! graph derived from it, the goal criteria, and optional metadata. The
//! [`PlanBuilder`] assembles plans fluently and validates the graph at
//! `build`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StrategyKind;

use super::goal::GoalState;
use super::graph::{GraphError, TaskGraph};
use super::task::Task;
use super::types::{PlanId, TaskId, TaskStatus};

/// A goal plus its task graph and chosen execution strategy.
pub struct Plan {
    id: PlanId,
    goal: String,
    strategy: Option<StrategyKind>,
    graph: TaskGraph,
    goal_state: GoalState,
    metadata: HashMap<String, Value>,
}

impl Plan {
    /// The plan id.
    pub fn id(&self) -> &PlanId {
        &self.id
    }

    /// The goal text this plan was decomposed from.
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Strategy chosen for this plan, when it overrides the executor's
    /// configured strategy.
    pub fn strategy(&self) -> Option<StrategyKind> {
        self.strategy
    }

    /// The task graph.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// The goal criteria.
    pub fn goal_state(&self) -> &GoalState {
        &self.goal_state
    }

    /// Free-form metadata attached by the decomposer.
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Decompose the plan into the parts the executor consumes.
    pub(crate) fn into_parts(self) -> (PlanId, TaskGraph, GoalState, HashMap<String, Value>) {
        (self.id, self.graph, self.goal_state, self.metadata)
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("id", &self.id)
            .field("goal", &self.goal)
            .field("strategy", &self.strategy)
            .field("tasks", &self.graph.len())
            .finish()
    }
}

/// Builder for constructing plans fluently.
///
/// # Example
///
/// ```ignore
/// use strategos::{PlanBuilder, Task};
///
/// let plan = PlanBuilder::new("research", "Survey recent findings")
///     .add_task(Task::new("gather", gather_action))
///     .add_task_with_deps(Task::new("summarize", summarize_action), &["gather"])
///     .build()?;
/// ```
pub struct PlanBuilder {
    id: PlanId,
    goal: String,
    strategy: Option<StrategyKind>,
    graph: TaskGraph,
    goal_state: GoalState,
    metadata: HashMap<String, Value>,
    error: Option<GraphError>,
}

impl PlanBuilder {
    /// Start a plan for the given goal.
    pub fn new(id: impl Into<PlanId>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            strategy: None,
            graph: TaskGraph::new(),
            goal_state: GoalState::default(),
            metadata: HashMap::new(),
            error: None,
        }
    }

    /// Override the subtask nesting bound (default 3).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        if self.graph.is_empty() {
            self.graph = TaskGraph::with_max_depth(max_depth);
        }
        self
    }

    /// Pin the execution strategy for this plan.
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the goal criteria.
    pub fn with_goal_state(mut self, goal_state: GoalState) -> Self {
        self.goal_state = goal_state;
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Add a task. The task's own declared dependencies are kept.
    pub fn add_task(mut self, task: Task) -> Self {
        if self.error.is_none() {
            if let Err(err) = self.graph.add_task(task) {
                self.error = Some(err);
            }
        }
        self
    }

    /// Add a task with dependencies on previously named tasks.
    pub fn add_task_with_deps(self, task: Task, depends_on: &[&str]) -> Self {
        self.add_task(task.with_dependencies(depends_on.iter().copied()))
    }

    /// Build the plan, validating the graph in the process.
    pub fn build(self) -> Result<Plan, GraphError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.graph.validate()?;
        Ok(Plan {
            id: self.id,
            goal: self.goal,
            strategy: self.strategy,
            graph: self.graph,
            goal_state: self.goal_state,
            metadata: self.metadata,
        })
    }
}

/// The per-task record handed back to the caller after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// The task this outcome belongs to.
    pub task_id: TaskId,
    /// Terminal status the task reached.
    pub status: TaskStatus,
    /// Result payload, present when the task completed.
    pub payload: Option<Value>,
    /// Error text, present when the task failed.
    pub error: Option<String>,
    /// Wall-clock time the task spent executing.
    pub duration: Duration,
}

impl TaskOutcome {
    /// Outcome for a completed task.
    pub fn completed(task_id: TaskId, payload: Value, duration: Duration) -> Self {
        Self {
            task_id,
            status: TaskStatus::Completed,
            payload: Some(payload),
            error: None,
            duration,
        }
    }

    /// Outcome for a failed task.
    pub fn failed(task_id: TaskId, error: String, duration: Duration) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            payload: None,
            error: Some(error),
            duration,
        }
    }

    /// Outcome for a task that never ran.
    pub fn skipped(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Skipped,
            payload: None,
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Whether the task completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}
