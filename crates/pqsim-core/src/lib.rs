//! pqsim: discrete-event simulator for parallel queue load balancing.
//!
//! This crate provides the simulation engine that models `n` single-server
//! FIFO queues fed by one arrival stream. Routing policies from
//! `pqsim-routing` sample `d` queues per arrival and pick one queue
//! (join-shortest-queue) or several (redundancy, threshold). Replicated jobs
//! finish when their first copy does; the remaining copies are cancelled.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────┐     ┌──────────────┐
//! │ Arrivals │────▶│  Engine   │────▶│   Monitors   │
//! │          │     │ (Events)  │     │   Metrics    │
//! └──────────┘     └─────┬─────┘     └──────────────┘
//!                        │
//!                ┌───────┴───────┐
//!                │ Sampler d / n │
//!                │    Policy     │
//!                └───────┬───────┘
//!                        │  1..d replicas
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │ Queue 0  │  │ Queue 1  │  │ Queue N  │
//!    │ 1 server │  │ 1 server │  │ 1 server │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```

pub mod arrivals;
pub mod clock;
pub mod config;
pub mod engine;
pub mod job;
pub mod metrics;
pub mod monitor;
pub mod queue;
pub mod random;
pub mod replica;
pub mod sampler;
pub mod trace;

// Re-export key types for convenience.
pub use clock::SimClock;
pub use config::{ConfigError, SimConfig};
pub use engine::{SimEvent, SimulationEngine};
pub use job::{Job, JobId, ReplicaKey, ReplicaState};
pub use metrics::{MetricsCollector, RunSummary};
pub use monitor::{Monitor, MonitorBus, MonitorError, MonitorEvent, MonitorOutput};
pub use queue::ServerQueue;
pub use random::{Distribution, DurationSampler, RandomStreams};
pub use replica::{ReplicaManager, ReplicaStats};
pub use trace::TraceEvent;

/// Run a complete simulation with the given config.
pub fn run_simulation(config: SimConfig) -> Result<RunSummary, ConfigError> {
    let mut engine = SimulationEngine::new(config)?;
    Ok(engine.run())
}

/// Run the same config once per policy name.
///
/// Each run replays the same seed, so differences come from routing alone.
/// `replication` is re-derived from the policy; `r` is kept, which
/// `threshold` requires.
pub fn compare_policies(
    config: &SimConfig,
    policy_names: &[&str],
) -> Result<Vec<RunSummary>, ConfigError> {
    policy_names
        .iter()
        .map(|name| {
            let mut cfg = config.clone();
            cfg.system.policy = Some(name.to_string());
            cfg.system.replication = None;
            if *name == "redundancy" {
                cfg.system.r = None;
            }
            run_simulation(cfg)
        })
        .collect()
}

/// Built-in policies `config` can be compared under: `threshold` only
/// when the config sets `r`.
pub fn comparable_policies(config: &SimConfig) -> Vec<&'static str> {
    pqsim_routing::available_policies()
        .into_iter()
        .filter(|&name| name != "threshold" || config.system.r.is_some())
        .collect()
}

/// Run the same config once per arrival rate, with exponential interarrivals.
pub fn sweep_arrival_rates(
    config: &SimConfig,
    rates: &[f64],
) -> Result<Vec<(f64, RunSummary)>, ConfigError> {
    rates
        .iter()
        .map(|&rate| {
            let mut cfg = config.clone();
            cfg.arrival = Distribution::Exponential { rate };
            Ok((rate, run_simulation(cfg)?))
        })
        .collect()
}
