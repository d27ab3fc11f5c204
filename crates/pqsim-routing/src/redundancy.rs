//! Redundancy-d routing.
//!
//! Places a replica on every sampled queue. The first replica to finish
//! service wins and the simulator cancels its siblings.

use crate::traits::*;

/// Full replication across the sample, no threshold.
pub struct RedundancyD;

impl RedundancyD {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RedundancyD {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingPolicy for RedundancyD {
    fn route(&self, sample: &QueueSample, _chooser: &mut dyn Chooser) -> RoutingDecision {
        assert!(!sample.is_empty(), "redundancy: empty queue sample");
        RoutingDecision::Replicate(sample.indices().collect())
    }

    fn name(&self) -> &str {
        "redundancy"
    }

    fn replicates(&self) -> bool {
        true
    }
}
