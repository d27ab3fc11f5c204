//! Queue sampling for d-choices routing.

use crate::config::ConfigError;
use crate::queue::ServerQueue;
use crate::random::RandomStreams;
use pqsim_routing::{QueueSample, SampledQueue};

/// Picks `d` of the `n` queues for each arrival and reads their occupancy.
#[derive(Debug, Clone, Copy)]
pub struct QueueSampler {
    n: usize,
    d: usize,
}

impl QueueSampler {
    /// # Errors
    ///
    /// [`ConfigError::Sampling`] unless `1 <= d <= n`.
    pub fn new(n: usize, d: usize) -> Result<Self, ConfigError> {
        if d == 0 || d > n {
            return Err(ConfigError::Sampling { d, n });
        }
        Ok(Self { n, d })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn d(&self) -> usize {
        self.d
    }

    /// Sampled queue indices.
    ///
    /// Sampling every queue returns `0..n` in order and takes no draw, so
    /// runs with `d == n` consume the random stream exactly like a model
    /// that never samples at all.
    pub fn indices(&self, streams: &mut RandomStreams) -> Vec<usize> {
        if self.d == self.n {
            (0..self.n).collect()
        } else {
            streams.sample_indices(self.n, self.d)
        }
    }

    /// Sample queues and pair each with its current jobs-in-system count.
    pub fn sample(&self, queues: &[ServerQueue], streams: &mut RandomStreams) -> QueueSample {
        debug_assert_eq!(queues.len(), self.n);
        QueueSample::new(
            self.indices(streams)
                .into_iter()
                .map(|index| SampledQueue {
                    index,
                    in_system: queues[index].in_system(),
                })
                .collect(),
        )
    }
}
