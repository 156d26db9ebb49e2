//! Mode selection for the adaptive strategy.
//!
//! The controller starts sequential and reconsiders once per dependency
//! level. Sequential promotes to parallel when the next level is wide
//! enough that its structural efficiency projection clears the threshold;
//! parallel demotes back when the last measured level fell below it. A
//! single rule in each direction, no hysteresis, no mid-level switches.

use tracing::debug;

use crate::timeline::{Timeline, TimelineEvent};

use super::metrics::{projected_efficiency, PerformanceTracker};

/// The two modes the adaptive strategy alternates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Sequential,
    Parallel,
}

impl Mode {
    fn name(self) -> &'static str {
        match self {
            Mode::Sequential => "sequential",
            Mode::Parallel => "parallel",
        }
    }
}

/// Per-run mode controller. Consulted once before each level.
pub(crate) struct AdaptiveController {
    mode: Mode,
    threshold: f64,
    max_workers: usize,
}

impl AdaptiveController {
    /// Start conservative: sequential until a level argues otherwise.
    pub fn new(threshold: f64, max_workers: usize) -> Self {
        Self {
            mode: Mode::Sequential,
            threshold,
            max_workers,
        }
    }

    /// The current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Pick the mode for a level of `level_size` ready tasks.
    ///
    /// Switches are recorded on the tracker and timeline. Efficiency equal
    /// to the threshold keeps the current mode in both directions.
    pub fn decide(
        &mut self,
        level_size: usize,
        tracker: &PerformanceTracker,
        timeline: &Timeline,
    ) -> Mode {
        let (next, efficiency) = match self.mode {
            Mode::Sequential => {
                let projected = projected_efficiency(level_size, self.max_workers);
                if level_size >= 2 && projected > self.threshold {
                    (Mode::Parallel, projected)
                } else {
                    (Mode::Sequential, projected)
                }
            }
            Mode::Parallel => match tracker.last_level_efficiency() {
                Some(observed) if observed < self.threshold => (Mode::Sequential, observed),
                Some(observed) => (Mode::Parallel, observed),
                // No parallel level has been measured; keep going.
                None => (Mode::Parallel, 1.0),
            },
        };

        if next != self.mode {
            debug!(
                from = self.mode.name(),
                to = next.name(),
                efficiency,
                "switching execution mode"
            );
            tracker.record_switch();
            timeline.record(TimelineEvent::strategy_switched(
                self.mode.name(),
                next.name(),
                efficiency,
            ));
            self.mode = next;
        }

        next
    }
}
