//! Testing utilities for users of the strategos library.
//!
//! This module provides helpers for testing plan execution:
//!
//! - Scripted actions ([`EmitAction`], [`FailAction`], [`SleepAction`],
//!   [`PanicAction`], [`FlakyAction`]) for building deterministic plans
//! - [`ConcurrencyGauge`]: measures how many actions actually overlap
//! - [`TestHarness`]: runs plans against a configuration with assertions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::ExecutorConfig;
use crate::core::plan::Plan;
use crate::core::task::{ActionContext, ActionError, TaskAction};
use crate::execution::executor::{Executor, PlanResult};

/// An action that immediately returns a fixed payload.
pub struct EmitAction {
    payload: Value,
}

impl EmitAction {
    /// Create an action that returns the given payload.
    pub fn new(payload: Value) -> Arc<Self> {
        Arc::new(Self { payload })
    }

    /// An action that returns an empty object.
    pub fn empty() -> Arc<Self> {
        Self::new(json!({}))
    }
}

#[async_trait]
impl TaskAction for EmitAction {
    async fn run(&self, _ctx: &ActionContext) -> Result<Value, ActionError> {
        Ok(self.payload.clone())
    }
}

/// An action that always fails.
pub struct FailAction {
    message: String,
}

impl FailAction {
    /// Create an action that fails with the given message.
    pub fn new(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            message: message.into(),
        })
    }
}

#[async_trait]
impl TaskAction for FailAction {
    async fn run(&self, _ctx: &ActionContext) -> Result<Value, ActionError> {
        Err(ActionError::Failed(self.message.clone()))
    }
}

/// An action that sleeps, then returns a payload.
///
/// The sleep is cancel-aware: when the run's cancellation token fires the
/// action stops promptly with [`ActionError::Cancelled`].
pub struct SleepAction {
    duration: Duration,
    payload: Value,
}

impl SleepAction {
    /// Sleep for `duration`, then return an empty object.
    pub fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            payload: json!({}),
        })
    }

    /// Sleep for `duration`, then return `payload`.
    pub fn with_payload(duration: Duration, payload: Value) -> Arc<Self> {
        Arc::new(Self { duration, payload })
    }
}

#[async_trait]
impl TaskAction for SleepAction {
    async fn run(&self, ctx: &ActionContext) -> Result<Value, ActionError> {
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => Ok(self.payload.clone()),
            _ = ctx.cancellation().cancelled() => Err(ActionError::Cancelled),
        }
    }
}

/// An action that panics, for exercising panic containment.
pub struct PanicAction {
    message: &'static str,
}

impl PanicAction {
    /// Create an action that panics with the given message.
    pub fn new(message: &'static str) -> Arc<Self> {
        Arc::new(Self { message })
    }
}

#[async_trait]
impl TaskAction for PanicAction {
    async fn run(&self, _ctx: &ActionContext) -> Result<Value, ActionError> {
        panic!("{}", self.message);
    }
}

/// An action that fails a configurable number of times before succeeding.
///
/// The failure counting is protected by a mutex so behavior stays
/// deterministic under concurrent execution.
pub struct FlakyAction {
    state: Mutex<FlakyState>,
    total_failures: u32,
    message: String,
}

struct FlakyState {
    failures_remaining: u32,
    call_count: u32,
}

impl FlakyAction {
    /// Create an action that fails `fail_count` times then succeeds.
    pub fn new(fail_count: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FlakyState {
                failures_remaining: fail_count,
                call_count: 0,
            }),
            total_failures: fail_count,
            message: "intentional test failure".to_string(),
        })
    }

    /// Number of times this action has been called.
    pub async fn call_count(&self) -> u32 {
        self.state.lock().await.call_count
    }

    /// Reset the failure counter for reuse.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.failures_remaining = self.total_failures;
        state.call_count = 0;
    }
}

#[async_trait]
impl TaskAction for FlakyAction {
    async fn run(&self, _ctx: &ActionContext) -> Result<Value, ActionError> {
        let mut state = self.state.lock().await;
        state.call_count += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            Err(ActionError::Failed(self.message.clone()))
        } else {
            Ok(json!({ "attempts": state.call_count }))
        }
    }
}

/// Measures how many gauged actions overlap in time.
///
/// # Example
///
/// ```ignore
/// use strategos::testing::ConcurrencyGauge;
/// use std::time::Duration;
///
/// let gauge = ConcurrencyGauge::new();
/// let plan = PlanBuilder::new("wide", "twenty independent tasks")
///     .add_task(Task::new("t0", gauge.action(Duration::from_millis(10))))
///     // ...
///     .build()?;
/// // after running:
/// assert!(gauge.peak() <= 2);
/// ```
#[derive(Clone, Default)]
pub struct ConcurrencyGauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// Holds a slot in the gauge; releases it on drop.
pub struct GaugeGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGauge {
    /// Create a gauge reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gauge; the returned guard leaves it when dropped.
    pub fn enter(&self) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard {
            current: Arc::clone(&self.current),
        }
    }

    /// Actions currently inside the gauge.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest overlap observed so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// An action that holds a gauge slot for `hold`, then succeeds.
    pub fn action(&self, hold: Duration) -> Arc<dyn TaskAction> {
        Arc::new(GaugedAction {
            gauge: self.clone(),
            hold,
        })
    }
}

struct GaugedAction {
    gauge: ConcurrencyGauge,
    hold: Duration,
}

#[async_trait]
impl TaskAction for GaugedAction {
    async fn run(&self, ctx: &ActionContext) -> Result<Value, ActionError> {
        let _guard = self.gauge.enter();
        tokio::select! {
            _ = tokio::time::sleep(self.hold) => Ok(json!({})),
            _ = ctx.cancellation().cancelled() => Err(ActionError::Cancelled),
        }
    }
}

/// A test harness for running plans against a configuration.
///
/// # Example
///
/// ```ignore
/// use strategos::testing::{EmitAction, TestHarness};
/// use strategos::{PlanBuilder, StrategyKind, Task};
///
/// let harness = TestHarness::new().with_max_parallel(2);
///
/// let plan = PlanBuilder::new("test", "Test plan")
///     .add_task(Task::new("a", EmitAction::empty()))
///     .build()?;
///
/// let result = harness.execute_and_assert_success(plan).await;
/// ```
pub struct TestHarness {
    config: ExecutorConfig,
}

impl TestHarness {
    /// Create a harness with a short per-task timeout suitable for tests.
    pub fn new() -> Self {
        Self {
            config: ExecutorConfig::new().with_task_timeout(Duration::from_secs(5)),
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the concurrency bound.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.config = self.config.with_max_parallel(max_parallel);
        self
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: crate::config::StrategyKind) -> Self {
        self.config = self.config.with_strategy(strategy);
        self
    }

    /// Set the per-task timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_task_timeout(timeout);
        self
    }

    /// The harness configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a plan and return the result.
    ///
    /// Panics if the harness configuration or the plan's graph is invalid;
    /// both are test-setup mistakes.
    pub async fn execute(&self, plan: Plan) -> PlanResult {
        let executor = Executor::new(self.config.clone()).expect("invalid harness configuration");
        executor.run(plan).await.expect("invalid plan graph")
    }

    /// Execute and assert the run succeeded.
    pub async fn execute_and_assert_success(&self, plan: Plan) -> PlanResult {
        let result = self.execute(plan).await;
        assert!(
            result.success,
            "expected run to succeed, but it failed: {:?}",
            result.error
        );
        result
    }

    /// Execute and assert the run failed.
    pub async fn execute_and_assert_failure(&self, plan: Plan) -> PlanResult {
        let result = self.execute(plan).await;
        assert!(!result.success, "expected run to fail, but it succeeded");
        result
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
