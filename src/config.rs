//! Executor configuration.
//!
//! [`ExecutorConfig`] carries every knob the execution engine recognizes:
//! the strategy, concurrency bound, goal-check cadence, adaptive threshold,
//! per-task timeout, and failure policy. `validate` rejects out-of-range
//! values before a run starts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `max_parallel` must allow at least one worker.
    #[error("max_parallel must be at least 1, got {0}")]
    InvalidMaxParallel(usize),

    /// `goal_check_interval` must cover at least one task.
    #[error("goal_check_interval must be at least 1, got {0}")]
    InvalidGoalCheckInterval(usize),

    /// `adaptive_threshold` must lie strictly between 0 and 1.
    #[error("adaptive_threshold must be in (0, 1), got {0}")]
    InvalidAdaptiveThreshold(f64),

    /// `task_timeout` must be non-zero.
    #[error("task_timeout must be greater than zero")]
    InvalidTaskTimeout,
}

/// Which execution strategy drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One task at a time, in topological order.
    Sequential,

    /// Whole dependency levels at once, bounded by `max_parallel`.
    Parallel,

    /// Starts sequential and switches between the two modes at level
    /// boundaries based on measured parallel efficiency (default).
    #[default]
    Adaptive,
}

/// What happens to the rest of the plan when a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Skip every remaining pending task after the first failure (default).
    #[default]
    AbortAll,

    /// Skip only the transitive dependents of the failed task; independent
    /// branches keep running.
    SkipDependents,
}

/// How individual goal criteria combine into an overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCombinator {
    /// Every criterion must be satisfied (default).
    #[default]
    All,

    /// Any single satisfied criterion satisfies the goal.
    Any,
}

/// Configuration for an [`Executor`](crate::execution::executor::Executor).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Execution strategy. A plan may override this per run.
    pub strategy: StrategyKind,

    /// Maximum number of tasks running concurrently.
    pub max_parallel: usize,

    /// Goal criteria are evaluated every this many completed tasks.
    pub goal_check_interval: usize,

    /// Parallel-efficiency cutoff for the adaptive strategy.
    pub adaptive_threshold: f64,

    /// Per-task execution deadline.
    pub task_timeout: Duration,

    /// Attempt budget surfaced to task actions through their context.
    ///
    /// The engine itself never re-runs a task; retrying is the action
    /// implementor's decision.
    pub max_retries: u32,

    /// Whether to record a timeline of events during the run.
    pub enable_timeline: bool,

    /// Failure policy applied when a task fails.
    pub error_policy: ErrorPolicy,

    /// How goal criteria combine.
    pub goal_combinator: GoalCombinator,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            max_parallel: 10,
            goal_check_interval: 1,
            adaptive_threshold: 0.6,
            task_timeout: Duration::from_secs(60),
            max_retries: 0,
            enable_timeline: true,
            error_policy: ErrorPolicy::default(),
            goal_combinator: GoalCombinator::default(),
        }
    }
}

impl ExecutorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the concurrency bound.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Set the goal-check cadence in completed tasks.
    pub fn with_goal_check_interval(mut self, interval: usize) -> Self {
        self.goal_check_interval = interval;
        self
    }

    /// Set the adaptive efficiency threshold.
    pub fn with_adaptive_threshold(mut self, threshold: f64) -> Self {
        self.adaptive_threshold = threshold;
        self
    }

    /// Set the per-task timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Set the attempt budget surfaced to actions.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enable or disable timeline recording.
    pub fn with_timeline(mut self, enabled: bool) -> Self {
        self.enable_timeline = enabled;
        self
    }

    /// Set the failure policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Set the goal combinator.
    pub fn with_goal_combinator(mut self, combinator: GoalCombinator) -> Self {
        self.goal_combinator = combinator;
        self
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel < 1 {
            return Err(ConfigError::InvalidMaxParallel(self.max_parallel));
        }
        if self.goal_check_interval < 1 {
            return Err(ConfigError::InvalidGoalCheckInterval(
                self.goal_check_interval,
            ));
        }
        if !(self.adaptive_threshold > 0.0 && self.adaptive_threshold < 1.0) {
            return Err(ConfigError::InvalidAdaptiveThreshold(
                self.adaptive_threshold,
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigError::InvalidTaskTimeout);
        }
        Ok(())
    }
}
