//! Routing policy trait definitions.
//!
//! All routing policies implement the [`RoutingPolicy`] trait, which receives
//! the occupancies of the sampled queues and decides which of them the job
//! (and any replicas) should join.

use serde::{Deserialize, Serialize};

/// Occupancy of one sampled queue, as seen by a routing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledQueue {
    /// Queue index in `0..n`.
    pub index: usize,
    /// Jobs waiting plus the one in service, if any.
    pub in_system: usize,
}

/// The d queues sampled for one arrival, in sampling order.
///
/// Order matters: tie-breaks and replica creation both follow it, so two
/// runs with the same seed must build identical samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSample {
    queues: Vec<SampledQueue>,
}

impl QueueSample {
    pub fn new(queues: Vec<SampledQueue>) -> Self {
        Self { queues }
    }

    /// Build a sample from `(index, in_system)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        Self {
            queues: pairs
                .into_iter()
                .map(|(index, in_system)| SampledQueue { index, in_system })
                .collect(),
        }
    }

    pub fn queues(&self) -> &[SampledQueue] {
        &self.queues
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Sampled queue indices in sampling order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.queues.iter().map(|q| q.index)
    }

    /// Smallest occupancy among the sampled queues.
    pub fn min_in_system(&self) -> Option<usize> {
        self.queues.iter().map(|q| q.in_system).min()
    }

    /// Whether `index` is part of this sample.
    pub fn contains(&self, index: usize) -> bool {
        self.queues.iter().any(|q| q.index == index)
    }
}

/// Source of uniform integer draws for policies that break ties randomly.
///
/// The simulator backs this with its seeded stream so every draw lands in
/// the same reproducible sequence as arrivals and service times.
pub trait Chooser {
    /// Uniform index in `0..len`. Callers never pass `len == 0`.
    fn choose(&mut self, len: usize) -> usize;
}

/// How `ShortestQueue` resolves several queues tied at the minimum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Uniform random choice among the tied queues (consumes one draw).
    #[default]
    Random,
    /// The tied queue with the smallest index (consumes no draw).
    LowestIndex,
}

/// Decision returned by a routing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Join a single queue, no replication.
    Route(usize),
    /// Place one replica on every listed queue.
    Replicate(Vec<usize>),
}

impl RoutingDecision {
    /// Target queues in the order replicas should be created.
    pub fn targets(&self) -> &[usize] {
        match self {
            RoutingDecision::Route(index) => std::slice::from_ref(index),
            RoutingDecision::Replicate(indices) => indices,
        }
    }

    pub fn len(&self) -> usize {
        self.targets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets().is_empty()
    }
}

/// The core routing policy trait.
///
/// Policies are pure: the decision depends only on the sample, the policy's
/// own configuration and the draws taken from `chooser`.
pub trait RoutingPolicy: Send + Sync {
    /// Called once per arrival with the sampled queues (never empty).
    fn route(&self, sample: &QueueSample, chooser: &mut dyn Chooser) -> RoutingDecision;

    /// Human-readable name for reports.
    fn name(&self) -> &str;

    /// Whether the policy may place more than one replica per job.
    fn replicates(&self) -> bool {
        false
    }
}

/// Uniform pick of one sampled queue; used by policies that need a fallback.
pub fn random_member(sample: &QueueSample, chooser: &mut dyn Chooser) -> usize {
    let pick = chooser.choose(sample.len());
    sample.queues()[pick].index
}
