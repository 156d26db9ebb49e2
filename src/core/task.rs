//! Task definitions and the opaque execution boundary.
//!
//! A [`Task`] is a declarative unit of work: an id, a classification, its
//! dependencies, and an [`TaskAction`] that produces the actual result. The
//! engine never looks inside an action; it may call a language model, a
//! tool, or any other I/O.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::types::{RunId, TaskId, TaskKind};

/// Errors returned by task actions.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action's own logic failed.
    #[error("{0}")]
    Failed(String),

    /// The action observed cancellation and stopped cooperatively.
    #[error("action cancelled")]
    Cancelled,

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Everything an action may observe about its surroundings.
///
/// The context carries identity for logging, the caller's retry budget
/// (informational; the engine never re-runs a task itself), and the
/// cancellation token threaded down from the executor.
#[derive(Clone)]
pub struct ActionContext {
    task_id: TaskId,
    run_id: RunId,
    max_retries: u32,
    cancel: CancellationToken,
}

impl ActionContext {
    /// Create a context for one task execution.
    pub fn new(task_id: TaskId, run_id: RunId, max_retries: u32, cancel: CancellationToken) -> Self {
        Self {
            task_id,
            run_id,
            max_retries,
            cancel,
        }
    }

    /// The id of the task being executed.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// The id of the run this execution belongs to.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The attempt budget configured by the caller.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The cancellation token for this run.
    ///
    /// Long-running actions should observe it and return
    /// [`ActionError::Cancelled`] promptly when it fires.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The opaque "run this task" boundary.
///
/// # Example
///
/// ```ignore
/// use strategos::{ActionContext, ActionError, TaskAction};
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// struct FetchSources;
///
/// #[async_trait]
/// impl TaskAction for FetchSources {
///     async fn run(&self, ctx: &ActionContext) -> Result<Value, ActionError> {
///         // ... call an external service ...
///         Ok(json!({ "sources": 3 }))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskAction: Send + Sync {
    /// Execute the task and return its result payload.
    async fn run(&self, ctx: &ActionContext) -> Result<Value, ActionError>;
}

/// A declarative task within a plan.
#[derive(Clone)]
pub struct Task {
    id: TaskId,
    description: String,
    kind: TaskKind,
    depends_on: Vec<TaskId>,
    subtasks: Vec<Task>,
    action: Arc<dyn TaskAction>,
}

impl Task {
    /// Create a task with the given id and action.
    pub fn new(id: impl Into<TaskId>, action: Arc<dyn TaskAction>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind: TaskKind::default(),
            depends_on: Vec::new(),
            subtasks: Vec::new(),
            action,
        }
    }

    /// Set a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the task classification.
    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declare dependencies on other tasks by id.
    pub fn with_dependencies<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Attach a subtask produced by decomposition.
    ///
    /// Subtasks document how the decomposer broke this task down; only
    /// top-level graph tasks are scheduled. Nesting depth is bounded by the
    /// graph's max depth.
    pub fn with_subtask(mut self, subtask: Task) -> Self {
        self.subtasks.push(subtask);
        self
    }

    /// The task id.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// The task description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The task classification.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Ids of the tasks this one depends on.
    pub fn depends_on(&self) -> &[TaskId] {
        &self.depends_on
    }

    /// Subtasks recorded by decomposition.
    pub fn subtasks(&self) -> &[Task] {
        &self.subtasks
    }

    /// The action executed for this task.
    pub fn action(&self) -> Arc<dyn TaskAction> {
        Arc::clone(&self.action)
    }

    /// Depth of the subtask tree below this task (0 when there are none).
    pub fn nesting_depth(&self) -> usize {
        self.subtasks
            .iter()
            .map(|s| 1 + s.nesting_depth())
            .max()
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("depends_on", &self.depends_on)
            .field("subtasks", &self.subtasks.len())
            .finish()
    }
}
