//! Observers of routing and replica lifecycle events.
//!
//! The engine publishes a closed set of [`MonitorEvent`]s to a
//! [`MonitorBus`]. Each attached [`Monitor`] declares which event kinds it
//! consumes and appends to its own store; monitors never touch simulation
//! state. Stores are read back by name as serializable [`MonitorOutput`]s.

use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("{output} requires the {monitor} monitor to be attached")]
    Required {
        monitor: &'static str,
        output: &'static str,
    },
}

/// Discriminant of [`MonitorEvent`], used for subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Routed,
    QueueSnapshot,
    JobCompleted,
}

/// Something observable happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A job was routed and its replicas spawned.
    Routed {
        time: f64,
        job: JobId,
        arrival: f64,
        sampled: Vec<usize>,
        chosen: Vec<usize>,
    },
    /// Per-queue occupancy after a routing or a completion.
    QueueSnapshot {
        time: f64,
        waiting: Vec<usize>,
        in_service: Vec<bool>,
    },
    /// A job's first replica finished service.
    JobCompleted {
        time: f64,
        job: JobId,
        queue: usize,
        arrival: f64,
        wait: f64,
        sojourn: f64,
        /// Queues whose sibling replicas were cancelled.
        cancelled: Vec<usize>,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::Routed { .. } => EventKind::Routed,
            MonitorEvent::QueueSnapshot { .. } => EventKind::QueueSnapshot,
            MonitorEvent::JobCompleted { .. } => EventKind::JobCompleted,
        }
    }

    pub fn time(&self) -> f64 {
        match self {
            MonitorEvent::Routed { time, .. }
            | MonitorEvent::QueueSnapshot { time, .. }
            | MonitorEvent::JobCompleted { time, .. } => *time,
        }
    }
}

/// Waiting lengths of every queue at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSizeSample {
    pub time: f64,
    pub waiting: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSetRecord {
    pub job: JobId,
    pub choices: Vec<usize>,
    pub entry: f64,
    /// Unset while the job is still in the system.
    pub exit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTimeRecord {
    pub job: JobId,
    pub entry: f64,
    pub exit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTotalRecord {
    pub job: JobId,
    pub total: f64,
}

/// A monitor's store, as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "monitor", content = "data")]
pub enum MonitorOutput {
    TimeQueueSize(Vec<QueueSizeSample>),
    ReplicaSets(Vec<ReplicaSetRecord>),
    JobTime(Vec<JobTimeRecord>),
    JobTotal(Vec<JobTotalRecord>),
    /// Replica-set size to number of jobs routed with that size.
    ReplicaClassCounts(BTreeMap<usize, u64>),
}

/// An observer attached to a [`MonitorBus`].
pub trait Monitor: fmt::Debug + Send {
    fn name(&self) -> &str;
    fn consumes(&self, kind: EventKind) -> bool;
    /// Record one event. Only called for kinds the monitor consumes.
    fn add(&mut self, event: &MonitorEvent);
    fn output(&self) -> MonitorOutput;
}

/// Waiting lengths over time. A later snapshot at the same instant
/// replaces the earlier one.
#[derive(Debug, Default)]
pub struct TimeQueueSize {
    samples: Vec<QueueSizeSample>,
}

impl Monitor for TimeQueueSize {
    fn name(&self) -> &str {
        "TimeQueueSize"
    }

    fn consumes(&self, kind: EventKind) -> bool {
        kind == EventKind::QueueSnapshot
    }

    fn add(&mut self, event: &MonitorEvent) {
        if let MonitorEvent::QueueSnapshot { time, waiting, .. } = event {
            match self.samples.last_mut() {
                Some(last) if last.time == *time => last.waiting.clone_from(waiting),
                _ => self.samples.push(QueueSizeSample {
                    time: *time,
                    waiting: waiting.clone(),
                }),
            }
        }
    }

    fn output(&self) -> MonitorOutput {
        MonitorOutput::TimeQueueSize(self.samples.clone())
    }
}

/// Chosen queues per job, with entry and exit times.
#[derive(Debug, Default)]
pub struct ReplicaSets {
    sets: BTreeMap<JobId, ReplicaSetRecord>,
}

impl Monitor for ReplicaSets {
    fn name(&self) -> &str {
        "ReplicaSets"
    }

    fn consumes(&self, kind: EventKind) -> bool {
        matches!(kind, EventKind::Routed | EventKind::JobCompleted)
    }

    fn add(&mut self, event: &MonitorEvent) {
        match event {
            MonitorEvent::Routed {
                time, job, chosen, ..
            } => {
                self.sets.insert(
                    *job,
                    ReplicaSetRecord {
                        job: *job,
                        choices: chosen.clone(),
                        entry: *time,
                        exit: None,
                    },
                );
            }
            MonitorEvent::JobCompleted { time, job, .. } => {
                if let Some(record) = self.sets.get_mut(job) {
                    record.exit = Some(*time);
                }
            }
            MonitorEvent::QueueSnapshot { .. } => {}
        }
    }

    fn output(&self) -> MonitorOutput {
        MonitorOutput::ReplicaSets(self.sets.values().cloned().collect())
    }
}

/// Entry and exit time of every completed job.
#[derive(Debug, Default)]
pub struct JobTime {
    jobs: BTreeMap<JobId, JobTimeRecord>,
}

impl Monitor for JobTime {
    fn name(&self) -> &str {
        "JobTime"
    }

    fn consumes(&self, kind: EventKind) -> bool {
        kind == EventKind::JobCompleted
    }

    fn add(&mut self, event: &MonitorEvent) {
        if let MonitorEvent::JobCompleted {
            time, job, arrival, ..
        } = event
        {
            self.jobs.insert(
                *job,
                JobTimeRecord {
                    job: *job,
                    entry: *arrival,
                    exit: *time,
                },
            );
        }
    }

    fn output(&self) -> MonitorOutput {
        MonitorOutput::JobTime(self.jobs.values().cloned().collect())
    }
}

/// Total time in system of every completed job.
#[derive(Debug, Default)]
pub struct JobTotal {
    totals: BTreeMap<JobId, f64>,
}

impl Monitor for JobTotal {
    fn name(&self) -> &str {
        "JobTotal"
    }

    fn consumes(&self, kind: EventKind) -> bool {
        kind == EventKind::JobCompleted
    }

    fn add(&mut self, event: &MonitorEvent) {
        if let MonitorEvent::JobCompleted { job, sojourn, .. } = event {
            self.totals.insert(*job, *sojourn);
        }
    }

    fn output(&self) -> MonitorOutput {
        MonitorOutput::JobTotal(
            self.totals
                .iter()
                .map(|(job, total)| JobTotalRecord {
                    job: *job,
                    total: *total,
                })
                .collect(),
        )
    }
}

/// How many jobs were routed to 1, 2, ... queues.
#[derive(Debug, Default)]
pub struct ReplicaClassCounts {
    counts: BTreeMap<usize, u64>,
}

impl Monitor for ReplicaClassCounts {
    fn name(&self) -> &str {
        "ReplicaClassCounts"
    }

    fn consumes(&self, kind: EventKind) -> bool {
        kind == EventKind::Routed
    }

    fn add(&mut self, event: &MonitorEvent) {
        if let MonitorEvent::Routed { chosen, .. } = event {
            *self.counts.entry(chosen.len()).or_insert(0) += 1;
        }
    }

    fn output(&self) -> MonitorOutput {
        MonitorOutput::ReplicaClassCounts(self.counts.clone())
    }
}

/// Create a built-in monitor by name.
pub fn monitor_by_name(name: &str) -> Option<Box<dyn Monitor>> {
    match name {
        "TimeQueueSize" => Some(Box::<TimeQueueSize>::default()),
        "ReplicaSets" => Some(Box::<ReplicaSets>::default()),
        "JobTime" => Some(Box::<JobTime>::default()),
        "JobTotal" => Some(Box::<JobTotal>::default()),
        "ReplicaClassCounts" => Some(Box::<ReplicaClassCounts>::default()),
        _ => None,
    }
}

/// List all built-in monitor names.
pub fn available_monitors() -> Vec<&'static str> {
    vec![
        "TimeQueueSize",
        "ReplicaSets",
        "JobTime",
        "JobTotal",
        "ReplicaClassCounts",
    ]
}

/// Fans events out to attached monitors in attachment order.
#[derive(Debug, Default)]
pub struct MonitorBus {
    monitors: Vec<Box<dyn Monitor>>,
}

impl MonitorBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach built-in monitors by name. Unknown names yield `None`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Option<Self> {
        let mut bus = Self::new();
        for name in names {
            bus.attach(monitor_by_name(name.as_ref())?);
        }
        Some(bus)
    }

    pub fn attach(&mut self, monitor: Box<dyn Monitor>) {
        self.monitors.push(monitor);
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.monitors.iter().map(|m| m.name())
    }

    /// Whether any attached monitor consumes `kind`. Lets the publisher
    /// skip building events nobody reads.
    pub fn wants(&self, kind: EventKind) -> bool {
        self.monitors.iter().any(|m| m.consumes(kind))
    }

    pub fn publish(&mut self, event: &MonitorEvent) {
        let kind = event.kind();
        for monitor in &mut self.monitors {
            if monitor.consumes(kind) {
                monitor.add(event);
            }
        }
    }

    /// Store of the monitor called `name`.
    pub fn output(&self, name: &str) -> Option<MonitorOutput> {
        self.monitors
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.output())
    }

    /// Every store, in attachment order.
    pub fn outputs(&self) -> Vec<(String, MonitorOutput)> {
        self.monitors
            .iter()
            .map(|m| (m.name().to_string(), m.output()))
            .collect()
    }

    /// Waiting lengths over time, one column per queue.
    ///
    /// # Errors
    ///
    /// [`MonitorError::Required`] unless `TimeQueueSize` is attached.
    pub fn occupancy_table(&self) -> Result<OccupancyTable, MonitorError> {
        match self.output("TimeQueueSize") {
            Some(MonitorOutput::TimeQueueSize(rows)) => Ok(OccupancyTable { rows }),
            _ => Err(MonitorError::Required {
                monitor: "TimeQueueSize",
                output: "occupancy table",
            }),
        }
    }

    /// Entry, exit and duration per completed job.
    ///
    /// # Errors
    ///
    /// [`MonitorError::Required`] unless `JobTime` is attached.
    pub fn job_table(&self) -> Result<JobTable, MonitorError> {
        match self.output("JobTime") {
            Some(MonitorOutput::JobTime(rows)) => Ok(JobTable { rows }),
            _ => Err(MonitorError::Required {
                monitor: "JobTime",
                output: "job table",
            }),
        }
    }
}

/// Time-indexed waiting lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyTable {
    pub rows: Vec<QueueSizeSample>,
}

impl OccupancyTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Waiting jobs summed over all queues, per row.
    pub fn totals(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.waiting.iter().sum()).collect()
    }

    /// Render as CSV with a `time` column followed by `q0..q{n-1}`.
    pub fn to_csv(&self) -> String {
        let width = self.rows.first().map_or(0, |r| r.waiting.len());
        let mut out = String::from("time");
        for i in 0..width {
            out.push_str(&format!(",q{}", i));
        }
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.time.to_string());
            for w in &row.waiting {
                out.push_str(&format!(",{}", w));
            }
            out.push('\n');
        }
        out
    }
}

/// Per-job entry and exit times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTable {
    pub rows: Vec<JobTimeRecord>,
}

impl JobTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.exit - r.entry).collect()
    }

    pub fn mean_duration(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        Some(self.durations().iter().sum::<f64>() / self.rows.len() as f64)
    }
}
