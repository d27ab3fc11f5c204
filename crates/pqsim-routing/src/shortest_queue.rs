//! Join-the-shortest-queue-of-d routing.
//!
//! Routes each job, without replication, to the sampled queue with the
//! fewest jobs in system. With `d == n` this is plain JSQ.

use crate::traits::*;

/// JSQ(d) router.
pub struct ShortestQueue {
    tie_break: TieBreak,
}

impl ShortestQueue {
    pub fn new() -> Self {
        Self::with_tie_break(TieBreak::default())
    }

    pub fn with_tie_break(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }
}

impl Default for ShortestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingPolicy for ShortestQueue {
    fn route(&self, sample: &QueueSample, chooser: &mut dyn Chooser) -> RoutingDecision {
        assert!(!sample.is_empty(), "shortest_queue: empty queue sample");
        let min = sample.min_in_system().unwrap_or(0);

        // Tied candidates keep sampling order so a random pick is reproducible.
        let tied: Vec<usize> = sample
            .queues()
            .iter()
            .filter(|q| q.in_system == min)
            .map(|q| q.index)
            .collect();

        let choice = match (tied.as_slice(), self.tie_break) {
            ([only], _) => *only,
            (_, TieBreak::Random) => tied[chooser.choose(tied.len())],
            (_, TieBreak::LowestIndex) => tied.iter().copied().min().unwrap_or(tied[0]),
        };

        RoutingDecision::Route(choice)
    }

    fn name(&self) -> &str {
        "shortest_queue"
    }
}
