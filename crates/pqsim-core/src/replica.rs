//! Replica lifecycle management.
//!
//! The [`ReplicaManager`] owns the queues and a flat table of live replicas
//! keyed by [`ReplicaKey`]. A job's replica set is just the ordered list of
//! its keys, so siblings reference each other by id and nothing owns
//! anything cyclically.
//!
//! ```text
//!            spawn                grant              service expiry
//!  Created ─────────▶ Waiting ─────────▶ InService ─────────────▶ Completed
//!                        │                   │
//!                        └──── sibling ──────┴────────────────▶ Cancelled
//!                              completed
//! ```
//!
//! Cancellation is applied inside [`ReplicaManager::complete`], at the same
//! virtual instant as the winning completion. Signals that reach a replica
//! that is already resolved are counted and otherwise ignored.

use crate::job::{JobId, Replica, ReplicaKey, ReplicaState};
use crate::queue::{Admission, ServerQueue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStats {
    pub created: u64,
    pub completed: u64,
    pub cancelled_waiting: u64,
    pub cancelled_in_service: u64,
    /// Signals (cancel, service start, completion) that found their replica
    /// already resolved.
    pub races_absorbed: u64,
}

impl ReplicaStats {
    pub fn cancelled(&self) -> u64 {
        self.cancelled_waiting + self.cancelled_in_service
    }
}

/// Result of delivering a cancellation to one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed from its queue's wait list.
    Withdrawn,
    /// Evicted from service; the freed server went to `granted`, if anyone.
    Preempted { granted: Option<ReplicaKey> },
    /// Already completed, cancelled or gone. Nothing changed.
    AlreadyResolved,
}

/// A sibling cancelled by a completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cancellation {
    pub key: ReplicaKey,
    /// State the sibling was in when cancelled.
    pub was: ReplicaState,
}

/// Everything that changed when a replica finished service.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub key: ReplicaKey,
    pub arrival_time: f64,
    pub granted_at: f64,
    pub finished_at: f64,
    /// Siblings cancelled, in replica-set order.
    pub cancelled: Vec<Cancellation>,
    /// Replicas that acquired a server as a consequence, in grant order.
    pub granted: Vec<ReplicaKey>,
}

impl Completion {
    pub fn wait(&self) -> f64 {
        self.granted_at - self.arrival_time
    }

    /// Arrival to completion.
    pub fn sojourn(&self) -> f64 {
        self.finished_at - self.arrival_time
    }
}

/// Owns queues, live replicas and replica sets.
#[derive(Debug, Clone)]
pub struct ReplicaManager {
    queues: Vec<ServerQueue>,
    replicas: HashMap<ReplicaKey, Replica>,
    sets: HashMap<JobId, Vec<ReplicaKey>>,
    stats: ReplicaStats,
}

impl ReplicaManager {
    /// Create a manager over `n` idle queues.
    pub fn new(n: usize) -> Self {
        Self {
            queues: (0..n).map(ServerQueue::new).collect(),
            replicas: HashMap::new(),
            sets: HashMap::new(),
            stats: ReplicaStats::default(),
        }
    }

    pub fn queues(&self) -> &[ServerQueue] {
        &self.queues
    }

    pub fn stats(&self) -> &ReplicaStats {
        &self.stats
    }

    pub fn replica(&self, key: &ReplicaKey) -> Option<&Replica> {
        self.replicas.get(key)
    }

    /// Keys of an unresolved job's replicas, in creation order.
    pub fn replica_set(&self, job: JobId) -> Option<&[ReplicaKey]> {
        self.sets.get(&job).map(|keys| keys.as_slice())
    }

    /// Jobs with at least one unresolved replica.
    pub fn jobs_in_flight(&self) -> usize {
        self.sets.len()
    }

    /// Live replica records.
    pub fn replicas_in_flight(&self) -> usize {
        self.replicas.len()
    }

    /// Create one replica per target and join each target queue.
    ///
    /// Returns the replicas that were granted an idle server immediately;
    /// the caller schedules their service start.
    ///
    /// # Panics
    ///
    /// Panics on an empty target list, a duplicate target, or a job that
    /// already has a live replica set.
    pub fn spawn(
        &mut self,
        job: JobId,
        arrival_time: f64,
        targets: &[usize],
        now: f64,
    ) -> Vec<ReplicaKey> {
        assert!(!targets.is_empty(), "{}: routed to no queue", job);
        assert!(
            !self.sets.contains_key(&job),
            "{}: replica set already exists",
            job
        );

        let mut keys = Vec::with_capacity(targets.len());
        let mut granted = Vec::new();
        for &queue in targets {
            let key = ReplicaKey::new(job, queue);
            assert!(!keys.contains(&key), "{}: duplicate target queue {}", job, queue);

            let mut replica = Replica::new(key, arrival_time);
            if let Admission::Granted = self.queues[queue].request(key) {
                replica.state = ReplicaState::InService;
                replica.granted_at = Some(now);
                granted.push(key);
            }
            self.replicas.insert(key, replica);
            self.stats.created += 1;
            keys.push(key);
        }
        self.sets.insert(job, keys);
        granted
    }

    /// Confirm a granted replica is about to be served.
    ///
    /// Returns its wait time, or `None` when the replica was cancelled
    /// between grant and service start.
    pub fn begin_service(&mut self, key: ReplicaKey) -> Option<f64> {
        match self.replicas.get(&key) {
            Some(r) if r.state == ReplicaState::InService => r.wait(),
            _ => {
                self.stats.races_absorbed += 1;
                None
            }
        }
    }

    /// Finish service for `key`, release its server and cancel its siblings.
    ///
    /// Returns `None` when the replica was already cancelled (its service
    /// timer fired after a sibling won). The job's records are dropped once
    /// the set is resolved.
    pub fn complete(&mut self, key: ReplicaKey, now: f64) -> Option<Completion> {
        let (arrival_time, granted_at) = match self.replicas.get_mut(&key) {
            Some(r) if r.state == ReplicaState::InService => {
                r.state = ReplicaState::Completed;
                (r.arrival_time, r.granted_at.unwrap_or(now))
            }
            _ => {
                self.stats.races_absorbed += 1;
                return None;
            }
        };
        self.stats.completed += 1;
        self.queues[key.queue].total_completed += 1;

        let mut granted = Vec::new();
        if let Some(next) = self.queues[key.queue].release(key) {
            self.mark_granted(next, now);
            granted.push(next);
        }

        let siblings = self.sets.remove(&key.job).unwrap_or_default();
        let mut cancelled = Vec::new();
        for sibling in siblings.iter().copied().filter(|k| *k != key) {
            let was = match self.replicas.get(&sibling) {
                Some(r) => r.state,
                None => continue,
            };
            match self.cancel(sibling, now) {
                CancelOutcome::Withdrawn => cancelled.push(Cancellation { key: sibling, was }),
                CancelOutcome::Preempted { granted: next } => {
                    cancelled.push(Cancellation { key: sibling, was });
                    granted.extend(next);
                }
                CancelOutcome::AlreadyResolved => {}
            }
        }

        for k in &siblings {
            self.replicas.remove(k);
        }
        self.replicas.remove(&key);

        Some(Completion {
            key,
            arrival_time,
            granted_at,
            finished_at: now,
            cancelled,
            granted,
        })
    }

    /// Deliver a cancellation signal to one replica. Idempotent.
    pub fn cancel(&mut self, key: ReplicaKey, now: f64) -> CancelOutcome {
        let state = match self.replicas.get(&key) {
            Some(r) if !r.state.is_terminal() => r.state,
            _ => {
                self.stats.races_absorbed += 1;
                return CancelOutcome::AlreadyResolved;
            }
        };

        let queue = &mut self.queues[key.queue];
        let outcome = match state {
            ReplicaState::Waiting => {
                let removed = queue.withdraw(key);
                assert!(removed, "{}: waiting replica missing from its queue", key);
                self.stats.cancelled_waiting += 1;
                CancelOutcome::Withdrawn
            }
            ReplicaState::InService => {
                let next = queue.release(key);
                self.stats.cancelled_in_service += 1;
                CancelOutcome::Preempted { granted: next }
            }
            ReplicaState::Completed | ReplicaState::Cancelled => unreachable!(),
        };
        queue.total_cancelled += 1;

        if let Some(r) = self.replicas.get_mut(&key) {
            r.state = ReplicaState::Cancelled;
        }
        if let CancelOutcome::Preempted { granted: Some(next) } = outcome {
            self.mark_granted(next, now);
        }
        outcome
    }

    fn mark_granted(&mut self, key: ReplicaKey, now: f64) {
        match self.replicas.get_mut(&key) {
            Some(r) if r.state == ReplicaState::Waiting => {
                r.state = ReplicaState::InService;
                r.granted_at = Some(now);
            }
            other => panic!("{}: granted a server in unexpected state {:?}", key, other),
        }
    }

    /// Check cross-structure invariants. Intended for tests.
    ///
    /// # Panics
    ///
    /// Panics describing the first violation found.
    pub fn assert_consistent(&self) {
        for queue in &self.queues {
            if let Some(occupant) = queue.occupant() {
                let state = self.replicas.get(&occupant).map(|r| r.state);
                assert_eq!(
                    state,
                    Some(ReplicaState::InService),
                    "queue {} occupant {}",
                    queue.id,
                    occupant
                );
            }
            for waiter in queue.waiting() {
                let state = self.replicas.get(waiter).map(|r| r.state);
                assert_eq!(
                    state,
                    Some(ReplicaState::Waiting),
                    "queue {} waiter {}",
                    queue.id,
                    waiter
                );
            }
        }
        for (job, keys) in &self.sets {
            assert!(!keys.is_empty(), "{}: empty replica set", job);
            for key in keys {
                assert!(self.replicas.contains_key(key), "{}: dangling key {}", job, key);
            }
        }
        let live = self
            .replicas
            .values()
            .filter(|r| !r.state.is_terminal())
            .count();
        let seated: usize = self.queues.iter().map(|q| q.in_system()).sum();
        assert_eq!(live, seated, "live replicas vs queue seats");
    }
}
