//! Simulated time.
//!
//! [`SimClock`] only moves when the engine pops an event or reaches its
//! horizon, so a run's timeline depends on the seed and nothing else.

use serde::{Deserialize, Serialize};

/// Monotonic simulated time.
///
/// Time is a dimensionless `f64`: interarrival and service draws come from
/// continuous distributions, so the clock keeps their exact values rather
/// than rounding to a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    now: f64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock already at `time`, e.g. to resume a checkpointed timeline.
    pub fn starting_at(time: f64) -> Self {
        Self { now: time }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Move to `time`. Staying at the current instant is allowed.
    ///
    /// # Panics
    ///
    /// Panics if `time` is in the past or not finite.
    pub fn advance_to(&mut self, time: f64) {
        assert!(
            time.is_finite() && time >= self.now,
            "clock cannot go from {} to {}",
            self.now,
            time,
        );
        self.now = time;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::starting_at(0.0)
    }
}
