//! Single-server FIFO queue.
//!
//! Each [`ServerQueue`] is a capacity-one mutual-exclusion resource: one
//! occupant in service and a FIFO wait list behind it. Granting is strictly
//! first-come first-served; a waiter removed by cancellation leaves the
//! order of the others untouched.

use crate::job::ReplicaKey;
use std::collections::VecDeque;

/// Outcome of a replica requesting a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The server was idle; the replica now holds it.
    Granted,
    /// The replica joined the wait list.
    Queued,
}

/// A simulated single-server queue.
#[derive(Debug, Clone)]
pub struct ServerQueue {
    /// Queue index.
    pub id: usize,
    /// Replica holding the server.
    occupant: Option<ReplicaKey>,
    /// Replicas waiting for the server, oldest first.
    waiting: VecDeque<ReplicaKey>,
    // --- Counters ---
    /// Replicas that started service here.
    pub total_granted: u64,
    /// Replicas that finished service here.
    pub total_completed: u64,
    /// Replicas withdrawn here by cancellation (waiting or in service).
    pub total_cancelled: u64,
}

impl ServerQueue {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            occupant: None,
            waiting: VecDeque::new(),
            total_granted: 0,
            total_completed: 0,
            total_cancelled: 0,
        }
    }

    /// Request the server for `key`.
    pub fn request(&mut self, key: ReplicaKey) -> Admission {
        if self.occupant.is_none() {
            debug_assert!(self.waiting.is_empty(), "idle server with waiters");
            self.occupant = Some(key);
            self.total_granted += 1;
            Admission::Granted
        } else {
            self.waiting.push_back(key);
            Admission::Queued
        }
    }

    /// Release the server held by `key` and grant it to the next waiter.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not the current occupant.
    pub fn release(&mut self, key: ReplicaKey) -> Option<ReplicaKey> {
        assert_eq!(
            self.occupant,
            Some(key),
            "queue {}: release by non-occupant",
            self.id
        );
        self.occupant = self.waiting.pop_front();
        if self.occupant.is_some() {
            self.total_granted += 1;
        }
        self.occupant
    }

    /// Remove a waiting replica. Returns false if it was not waiting here.
    pub fn withdraw(&mut self, key: ReplicaKey) -> bool {
        match self.waiting.iter().position(|k| *k == key) {
            Some(pos) => {
                self.waiting.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn occupant(&self) -> Option<ReplicaKey> {
        self.occupant
    }

    pub fn waiting(&self) -> impl Iterator<Item = &ReplicaKey> {
        self.waiting.iter()
    }

    /// Number of replicas in the wait list.
    pub fn queue_len(&self) -> usize {
        self.waiting.len()
    }

    /// 0 or 1.
    pub fn in_service(&self) -> usize {
        usize::from(self.occupant.is_some())
    }

    /// Waiting plus in service.
    pub fn in_system(&self) -> usize {
        self.waiting.len() + self.in_service()
    }

    pub fn is_idle(&self) -> bool {
        self.occupant.is_none()
    }
}
