//! Per-run performance tracking.
//!
//! The [`PerformanceTracker`] accumulates throughput, latency, and
//! parallel-efficiency samples during a run. It is created fresh per run,
//! updated under a lock from completion callbacks, and discarded once the
//! final [`ExecutionMetrics`] snapshot is taken. The adaptive strategy
//! reads its level samples to decide when to switch modes.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Final metrics for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Completed tasks per second of wall-clock time.
    pub tasks_per_second: f64,
    /// Mean execution time of tasks that ran.
    pub average_latency: Duration,
    /// Mean measured parallel efficiency over parallel levels
    /// (0.0 when no level ran in parallel).
    pub parallel_efficiency: f64,
    /// How many times the adaptive strategy switched modes.
    pub strategy_switches: u32,
    /// Completed tasks over tasks that reached a terminal state.
    pub success_rate: f64,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Tasks that completed successfully.
    pub completed: usize,
    /// Tasks that failed, timed out, or panicked.
    pub failed: usize,
    /// Tasks that never ran.
    pub skipped: usize,
}

#[derive(Default)]
struct TrackerState {
    completed: usize,
    failed: usize,
    ran: usize,
    busy: Duration,
    level_samples: Vec<f64>,
    switches: u32,
}

/// Accumulates measurements during a single run.
pub struct PerformanceTracker {
    max_workers: usize,
    state: Mutex<TrackerState>,
}

impl PerformanceTracker {
    /// Create a tracker for a run bounded by `max_workers`.
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Record one task reaching a terminal state after running.
    pub fn record_task(&self, duration: Duration, success: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.ran += 1;
            state.busy += duration;
            if success {
                state.completed += 1;
            } else {
                state.failed += 1;
            }
        }
    }

    /// Record a completed dependency level that ran in parallel and return
    /// its measured efficiency.
    ///
    /// Efficiency is observed throughput against the theoretical bound:
    /// total task busy time over level wall time times the number of
    /// workers the level could actually use. An unmeasurable level (zero
    /// wall time, no tasks) reports 0.0, which reads as "parallelism did
    /// not pay off" and steers the adaptive strategy back to sequential.
    pub fn record_level(&self, wall: Duration, busy: Duration, size: usize) -> f64 {
        let efficiency = level_efficiency(wall, busy, size, self.max_workers);
        if let Ok(mut state) = self.state.lock() {
            state.level_samples.push(efficiency);
        }
        efficiency
    }

    /// Efficiency measured for the most recent parallel level.
    pub fn last_level_efficiency(&self) -> Option<f64> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.level_samples.last().copied())
    }

    /// Record a strategy switch.
    pub fn record_switch(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.switches += 1;
        }
    }

    /// Number of strategy switches so far.
    pub fn switches(&self) -> u32 {
        self.state.lock().map(|s| s.switches).unwrap_or(0)
    }

    /// Take the final snapshot for the run.
    pub fn snapshot(&self, skipped: usize, duration: Duration) -> ExecutionMetrics {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => {
                return ExecutionMetrics {
                    tasks_per_second: 0.0,
                    average_latency: Duration::ZERO,
                    parallel_efficiency: 0.0,
                    strategy_switches: 0,
                    success_rate: 0.0,
                    duration,
                    completed: 0,
                    failed: 0,
                    skipped,
                }
            }
        };

        let secs = duration.as_secs_f64();
        let tasks_per_second = if secs > 0.0 {
            state.completed as f64 / secs
        } else {
            0.0
        };
        let average_latency = if state.ran > 0 {
            state.busy / state.ran as u32
        } else {
            Duration::ZERO
        };
        let terminal = state.completed + state.failed + skipped;
        let success_rate = if terminal > 0 {
            state.completed as f64 / terminal as f64
        } else {
            0.0
        };
        let parallel_efficiency = if state.level_samples.is_empty() {
            0.0
        } else {
            state.level_samples.iter().sum::<f64>() / state.level_samples.len() as f64
        };

        ExecutionMetrics {
            tasks_per_second,
            average_latency,
            parallel_efficiency,
            strategy_switches: state.switches,
            success_rate,
            duration,
            completed: state.completed,
            failed: state.failed,
            skipped,
        }
    }
}

/// Measured efficiency of one parallel level.
fn level_efficiency(wall: Duration, busy: Duration, size: usize, max_workers: usize) -> f64 {
    let usable = max_workers.min(size);
    if usable == 0 || wall.is_zero() {
        return 0.0;
    }
    (busy.as_secs_f64() / (wall.as_secs_f64() * usable as f64)).min(1.0)
}

/// Structural efficiency projection for a level that has not run yet.
///
/// A level of n independent tasks on w workers takes ceil(n / w) waves;
/// projected efficiency is n over the slots those waves occupy. This needs
/// no measurement, so the adaptive strategy can use it before committing
/// to parallel execution.
pub fn projected_efficiency(size: usize, max_workers: usize) -> f64 {
    if size == 0 || max_workers == 0 {
        return 0.0;
    }
    let waves = size.div_ceil(max_workers);
    let width = max_workers.min(size);
    size as f64 / (waves * width) as f64
}
