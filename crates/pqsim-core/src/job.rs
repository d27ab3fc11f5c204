//! Job and replica model.
//!
//! A [`Job`] is created once per arrival. Routing turns it into one or more
//! [`Replica`]s, each identified by a [`ReplicaKey`] (job, queue). Replicas
//! never own each other; siblings are found through their shared job id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential job identity, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job{:02}", self.0)
    }
}

/// A job flowing through the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Virtual time of arrival.
    pub arrival_time: f64,
    /// Queues chosen by the routing policy; empty until routed.
    pub chosen: Vec<usize>,
}

impl Job {
    pub fn new(id: JobId, arrival_time: f64) -> Self {
        Self {
            id,
            arrival_time,
            chosen: Vec::new(),
        }
    }
}

/// One copy of a job on one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaKey {
    pub job: JobId,
    pub queue: usize,
}

impl ReplicaKey {
    pub fn new(job: JobId, queue: usize) -> Self {
        Self { job, queue }
    }
}

impl fmt::Display for ReplicaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.job, self.queue)
    }
}

/// Lifecycle state of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaState {
    /// In its queue's wait list.
    Waiting,
    /// Holding its queue's single server.
    InService,
    /// Finished service first among its siblings. Terminal.
    Completed,
    /// Withdrawn because a sibling completed. Terminal.
    Cancelled,
}

impl ReplicaState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplicaState::Completed | ReplicaState::Cancelled)
    }
}

/// Tracking state for one replica.
#[derive(Debug, Clone)]
pub struct Replica {
    pub key: ReplicaKey,
    pub state: ReplicaState,
    /// Arrival time of the owning job.
    pub arrival_time: f64,
    /// When the replica was granted its queue's server.
    pub granted_at: Option<f64>,
}

impl Replica {
    pub fn new(key: ReplicaKey, arrival_time: f64) -> Self {
        Self {
            key,
            state: ReplicaState::Waiting,
            arrival_time,
            granted_at: None,
        }
    }

    /// Time spent waiting before service, once granted.
    pub fn wait(&self) -> Option<f64> {
        self.granted_at.map(|t| t - self.arrival_time)
    }
}
