pub mod config;
pub mod core;
pub mod execution;
pub mod testing;
pub mod timeline;

pub use config::{ConfigError, ErrorPolicy, ExecutorConfig, GoalCombinator, StrategyKind};
pub use core::goal::{CompareOp, GoalChecker, GoalCriterion, GoalState};
pub use core::graph::{DependencyLevel, GraphError, TaskGraph};
pub use core::plan::{Plan, PlanBuilder, TaskOutcome};
pub use core::task::{ActionContext, ActionError, Task, TaskAction};
pub use core::types::{PlanId, RunId, TaskId, TaskKind, TaskStatus};
pub use execution::executor::{Executor, PlanResult, RunError};
pub use execution::metrics::{ExecutionMetrics, PerformanceTracker};
pub use execution::pool::{PoolError, PoolHandle, WorkerPool};
pub use timeline::{Timeline, TimelineEvent, TimelineEventKind};
