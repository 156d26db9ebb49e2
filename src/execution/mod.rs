//! The execution engine.
//!
//! Strategies, the worker pool, adaptive mode selection, performance
//! tracking, and the executor that ties them together.

pub(crate) mod adaptive;
pub mod executor;
pub mod metrics;
pub mod pool;
pub(crate) mod strategy;

pub use executor::{Executor, PlanResult, RunError};
pub use metrics::{ExecutionMetrics, PerformanceTracker};
pub use pool::{PoolError, PoolHandle, WorkerPool};
