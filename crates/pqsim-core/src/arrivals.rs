//! Arrival process.
//!
//! The generator is resumed once per `ArrivalTick`. Each resumption spawns
//! the next job at the current instant and draws the gap to the following
//! tick. A bounded generator stops after its last job, so a run of `N` jobs
//! draws `N` gaps, the last of which only moves the arrival process forward.

use crate::job::{Job, JobId};
use crate::random::RandomStreams;

/// One resumption of the arrival process.
#[derive(Debug, Clone)]
pub struct Arrival {
    pub job: Job,
    /// When the process resumes next.
    pub next_at: f64,
}

/// Spawns jobs with sequential ids starting at 1.
#[derive(Debug, Clone)]
pub struct ArrivalGenerator {
    limit: Option<u64>,
    generated: u64,
}

impl ArrivalGenerator {
    /// `limit = None` generates forever.
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            generated: 0,
        }
    }

    pub fn bounded(number_jobs: u64) -> Self {
        Self::new(Some(number_jobs))
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Jobs spawned so far.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.generated >= limit)
    }

    /// Spawn the next job at `now` and draw the gap to the next arrival.
    ///
    /// Returns `None` once the limit is reached; no draw is taken then.
    pub fn resume(&mut self, now: f64, streams: &mut RandomStreams) -> Option<Arrival> {
        if self.is_exhausted() {
            return None;
        }
        self.generated += 1;
        let job = Job::new(JobId(self.generated), now);
        let gap = streams.interarrival();
        Some(Arrival {
            job,
            next_at: now + gap,
        })
    }
}
