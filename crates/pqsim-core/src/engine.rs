//! Discrete-event simulation engine.
//!
//! The engine maintains a priority queue of [`SimEvent`]s ordered by virtual
//! time, then by scheduling order. Each iteration pops the next event,
//! advances the clock and handles it, possibly scheduling more events at the
//! same or later instants. Every process of the model (the arrival stream,
//! a job's routing step, a replica waiting for and receiving service) is an
//! explicit event here; none of them blocks another.

use crate::arrivals::ArrivalGenerator;
use crate::clock::SimClock;
use crate::config::{ConfigError, SimConfig};
use crate::job::{Job, ReplicaKey, ReplicaState};
use crate::metrics::{JobMetric, MetricsCollector, RunSummary, RunTotals};
use crate::monitor::{EventKind, Monitor, MonitorBus, MonitorEvent};
use crate::queue::ServerQueue;
use crate::random::RandomStreams;
use crate::replica::ReplicaManager;
use crate::sampler::QueueSampler;
use crate::trace::TraceEvent;
use pqsim_routing::RoutingPolicy;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, info, trace};

/// Events in the discrete-event simulation.
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// Resume the arrival process.
    ArrivalTick,
    /// Sample queues for a new job and spawn its replicas.
    RouteJob(Job),
    /// A granted replica begins service and draws its duration.
    ServiceStart(ReplicaKey),
    /// A replica's service time has elapsed.
    ServiceComplete(ReplicaKey),
}

/// A timestamped event for the priority queue.
#[derive(Debug, Clone)]
struct TimedEvent {
    time: f64,
    sequence: u64,
    event: SimEvent,
}

impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimedEvent {}

impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want min-heap
        other
            .time
            .total_cmp(&self.time)
            .then(other.sequence.cmp(&self.sequence))
    }
}

/// The main simulation engine.
pub struct SimulationEngine {
    /// Virtual clock.
    pub clock: SimClock,
    /// Event queue (min-heap by time, then sequence).
    event_queue: BinaryHeap<TimedEvent>,
    /// Sequence counter for tie-breaking.
    sequence: u64,
    replicas: ReplicaManager,
    sampler: QueueSampler,
    policy: Box<dyn RoutingPolicy>,
    streams: RandomStreams,
    arrivals: ArrivalGenerator,
    monitors: MonitorBus,
    /// Metrics collector.
    pub metrics: MetricsCollector,
    trace: Option<Vec<TraceEvent>>,
    max_time: Option<f64>,
    started: bool,
    /// Total events processed.
    pub events_processed: u64,
    config: SimConfig,
}

impl SimulationEngine {
    /// Create an engine with the policy, distributions and monitors named in
    /// `config`.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.system.build_policy()?;
        let streams = RandomStreams::from_distributions(
            config.simulation.seed,
            &config.arrival,
            &config.service,
        )?;
        let monitors = MonitorBus::from_names(&config.monitors.enabled).ok_or_else(|| {
            ConfigError::UnknownMonitor(config.monitors.enabled.join(", "))
        })?;
        Self::from_parts(config, policy, streams, monitors)
    }

    /// Create an engine from explicit parts, e.g. a custom policy or
    /// duration sampler. The config still supplies the system shape and
    /// the horizon.
    pub fn from_parts(
        config: SimConfig,
        policy: Box<dyn RoutingPolicy>,
        streams: RandomStreams,
        monitors: MonitorBus,
    ) -> Result<Self, ConfigError> {
        config.validate_structure()?;
        let sampler = QueueSampler::new(config.system.parallelism, config.system.d)?;
        let trace = config.simulation.record_trace.then(Vec::new);
        Ok(Self {
            clock: SimClock::new(),
            event_queue: BinaryHeap::new(),
            sequence: 0,
            replicas: ReplicaManager::new(config.system.parallelism),
            sampler,
            policy,
            streams,
            arrivals: ArrivalGenerator::new(config.run.arrival_limit()),
            monitors,
            metrics: MetricsCollector::new(config.simulation.warmup_jobs),
            trace,
            max_time: config.run.max_time,
            started: false,
            events_processed: 0,
            config,
        })
    }

    /// Attach another monitor. Events already published are not replayed.
    pub fn attach_monitor(&mut self, monitor: Box<dyn Monitor>) {
        self.monitors.attach(monitor);
    }

    /// Schedule an event at a given time.
    pub fn schedule_event(&mut self, time: f64, event: SimEvent) {
        debug_assert!(time >= self.clock.now(), "event scheduled in the past");
        self.event_queue.push(TimedEvent {
            time,
            sequence: self.sequence,
            event,
        });
        self.sequence += 1;
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(
            name = %self.config.simulation.name,
            seed = self.streams.seed(),
            policy = self.policy.name(),
            n = self.sampler.n(),
            d = self.sampler.d(),
            jobs = ?self.arrivals.limit(),
            max_time = ?self.max_time,
            "starting simulation"
        );
        let now = self.clock.now();
        self.schedule_event(now, SimEvent::ArrivalTick);
    }

    /// Process the next event if it falls before the configured horizon.
    ///
    /// Returns false when nothing was processed.
    pub fn step(&mut self) -> bool {
        self.step_before(self.max_time)
    }

    fn step_before(&mut self, limit: Option<f64>) -> bool {
        self.start();
        match (self.event_queue.peek(), limit) {
            (None, _) => return false,
            (Some(next), Some(limit)) if next.time >= limit => return false,
            _ => {}
        }
        let Some(timed) = self.event_queue.pop() else {
            return false;
        };
        self.clock.advance_to(timed.time);
        self.process_event(timed.event);
        self.events_processed += 1;
        true
    }

    /// Process every event strictly before `until`, then move the clock
    /// to `until`.
    pub fn run_until(&mut self, until: f64) {
        while self.step_before(Some(until)) {}
        if until > self.clock.now() {
            self.clock.advance_to(until);
        }
    }

    /// Run the simulation to its horizon.
    pub fn run(&mut self) -> RunSummary {
        match self.max_time {
            Some(t) => self.run_until(t),
            None => while self.step() {},
        }
        let summary = self.summary();
        info!(
            end_time = summary.end_time,
            arrived = summary.jobs_arrived,
            completed = summary.jobs_completed,
            in_flight = summary.jobs_in_flight,
            events = summary.events_processed,
            races = summary.replicas.races_absorbed,
            "simulation finished"
        );
        summary
    }

    /// Summarize the run so far.
    pub fn summary(&self) -> RunSummary {
        let totals = RunTotals {
            policy: self.policy.name().to_string(),
            seed: self.streams.seed(),
            end_time: self.clock.now(),
            jobs_arrived: self.arrivals.generated(),
            jobs_in_flight: self.replicas.jobs_in_flight() as u64,
            events_processed: self.events_processed,
        };
        self.metrics
            .aggregate(totals, self.replicas.queues(), self.replicas.stats())
    }

    /// Process a single event.
    fn process_event(&mut self, event: SimEvent) {
        match event {
            SimEvent::ArrivalTick => self.handle_arrival_tick(),
            SimEvent::RouteJob(job) => self.handle_route(job),
            SimEvent::ServiceStart(key) => self.handle_service_start(key),
            SimEvent::ServiceComplete(key) => self.handle_service_complete(key),
        }
    }

    /// Spawn the next job and schedule the arrival after it.
    fn handle_arrival_tick(&mut self) {
        let now = self.clock.now();
        if let Some(arrival) = self.arrivals.resume(now, &mut self.streams) {
            self.schedule_event(now, SimEvent::RouteJob(arrival.job));
            self.schedule_event(arrival.next_at, SimEvent::ArrivalTick);
        }
    }

    /// Sample, route and spawn replicas for one job.
    fn handle_route(&mut self, mut job: Job) {
        let now = self.clock.now();
        let sample = self.sampler.sample(self.replicas.queues(), &mut self.streams);
        let decision = self.policy.route(&sample, &mut self.streams);
        job.chosen = decision.targets().to_vec();

        self.record(TraceEvent::Arrival {
            time: job.arrival_time,
            job: job.id,
            copies: job.chosen.len(),
            replicated: self.policy.replicates(),
        });

        let granted = self
            .replicas
            .spawn(job.id, job.arrival_time, &job.chosen, now);
        for key in granted {
            self.schedule_event(now, SimEvent::ServiceStart(key));
        }

        if self.monitors.wants(EventKind::Routed) {
            self.monitors.publish(&MonitorEvent::Routed {
                time: now,
                job: job.id,
                arrival: job.arrival_time,
                sampled: sample.indices().collect(),
                chosen: job.chosen,
            });
        }
        self.publish_snapshot();
    }

    fn handle_service_start(&mut self, key: ReplicaKey) {
        let now = self.clock.now();
        let Some(wait) = self.replicas.begin_service(key) else {
            trace!(replica = %key, time = now, "service start after cancellation");
            return;
        };
        self.record(TraceEvent::Waited {
            time: now,
            replica: key,
            wait,
        });
        let duration = self.streams.service_time();
        self.schedule_event(now + duration, SimEvent::ServiceComplete(key));
    }

    fn handle_service_complete(&mut self, key: ReplicaKey) {
        let now = self.clock.now();
        let Some(done) = self.replicas.complete(key, now) else {
            trace!(replica = %key, time = now, "completion after cancellation");
            return;
        };

        self.record(TraceEvent::Finished {
            time: now,
            replica: key,
            total: done.sojourn(),
        });
        for cancelled in &done.cancelled {
            self.record(TraceEvent::Interrupted {
                time: now,
                replica: cancelled.key,
                in_service: cancelled.was == ReplicaState::InService,
            });
        }
        for next in &done.granted {
            self.schedule_event(now, SimEvent::ServiceStart(*next));
        }

        self.metrics.record(JobMetric {
            job: key.job,
            queue: key.queue,
            arrival_time: done.arrival_time,
            wait: done.wait(),
            sojourn: done.sojourn(),
            copies: 1 + done.cancelled.len(),
        });

        if self.monitors.wants(EventKind::JobCompleted) {
            self.monitors.publish(&MonitorEvent::JobCompleted {
                time: now,
                job: key.job,
                queue: key.queue,
                arrival: done.arrival_time,
                wait: done.wait(),
                sojourn: done.sojourn(),
                cancelled: done.cancelled.iter().map(|c| c.key.queue).collect(),
            });
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&mut self) {
        if !self.monitors.wants(EventKind::QueueSnapshot) {
            return;
        }
        let queues = self.replicas.queues();
        let event = MonitorEvent::QueueSnapshot {
            time: self.clock.now(),
            waiting: queues.iter().map(|q| q.queue_len()).collect(),
            in_service: queues.iter().map(|q| !q.is_idle()).collect(),
        };
        self.monitors.publish(&event);
    }

    fn record(&mut self, event: TraceEvent) {
        debug!("{}", event);
        if let Some(trace) = self.trace.as_mut() {
            trace.push(event);
        }
    }

    /// Get the number of pending events.
    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn monitors(&self) -> &MonitorBus {
        &self.monitors
    }

    /// Recorded trace, if `record_trace` was set.
    pub fn trace(&self) -> Option<&[TraceEvent]> {
        self.trace.as_deref()
    }

    pub fn queues(&self) -> &[ServerQueue] {
        self.replicas.queues()
    }

    pub fn replicas(&self) -> &ReplicaManager {
        &self.replicas
    }

    /// Random draws taken so far.
    pub fn draws(&self) -> u64 {
        self.streams.draws()
    }

    /// Jobs spawned by the arrival process so far.
    pub fn jobs_arrived(&self) -> u64 {
        self.arrivals.generated()
    }
}
