//! Threshold-(d,r) routing.
//!
//! Redundancy restricted to sampled queues holding at most `r` jobs. When no
//! sampled queue qualifies the job still gets exactly one replica, placed on a
//! uniformly random member of the sample.

use crate::traits::*;

/// Threshold-(d,r) router.
pub struct ThresholdDR {
    threshold: usize,
}

impl ThresholdDR {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl RoutingPolicy for ThresholdDR {
    fn route(&self, sample: &QueueSample, chooser: &mut dyn Chooser) -> RoutingDecision {
        assert!(!sample.is_empty(), "threshold: empty queue sample");

        let eligible: Vec<usize> = sample
            .queues()
            .iter()
            .filter(|q| q.in_system <= self.threshold)
            .map(|q| q.index)
            .collect();

        if eligible.is_empty() {
            return RoutingDecision::Replicate(vec![random_member(sample, chooser)]);
        }
        RoutingDecision::Replicate(eligible)
    }

    fn name(&self) -> &str {
        "threshold"
    }

    fn replicates(&self) -> bool {
        true
    }
}
