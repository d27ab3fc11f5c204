//! TOML configuration parsing for pqsim.
//!
//! Defines the configuration schema for a simulation run: the queue system,
//! arrival and service distributions, the run horizon and the monitors to
//! attach. Everything is validated before a single event is scheduled.

use crate::random::{Distribution, DistributionError};
use crate::sampler::QueueSampler;
use pqsim_routing::{RoutingPolicy, TieBreak};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
    #[error("number_jobs = {number_jobs} conflicts with infinite_jobs = true")]
    ConflictingHorizon { number_jobs: u64 },
    #[error("infinite_jobs requires max_time or max_jobs")]
    UnboundedWithoutLimit,
    #[error("cannot sample d = {d} of n = {n} queues")]
    Sampling { d: usize, n: usize },
    #[error("Unknown routing policy: {0}")]
    UnknownPolicy(String),
    #[error("Unknown monitor: {0}")]
    UnknownMonitor(String),
    #[error("Policy mismatch: {0}")]
    PolicyMismatch(String),
    #[error("Invalid distribution: {0}")]
    Distribution(#[from] DistributionError),
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationSection,
    pub system: SystemSection,
    /// Interarrival time distribution.
    pub arrival: Distribution,
    /// Service time distribution.
    pub service: Distribution,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub monitors: MonitorsSection,
}

/// General simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Human-readable name for this simulation.
    #[serde(default = "default_sim_name")]
    pub name: String,
    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Keep a per-event trace of the run.
    #[serde(default)]
    pub record_trace: bool,
    /// Number of completed jobs to discard from metrics.
    #[serde(default)]
    pub warmup_jobs: u64,
}

fn default_sim_name() -> String {
    "simulation".to_string()
}

fn default_seed() -> u64 {
    42
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: default_sim_name(),
            seed: default_seed(),
            record_trace: false,
            warmup_jobs: 0,
        }
    }
}

/// The parallel queue system and how jobs are routed into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSection {
    /// Number of single-server queues, `n`.
    pub parallelism: usize,
    /// Queues sampled per arrival.
    pub d: usize,
    /// Replication threshold on jobs in system.
    #[serde(default)]
    pub r: Option<usize>,
    /// Whether jobs may be copied to several queues. Unset means "infer
    /// from `policy`".
    #[serde(default)]
    pub replication: Option<bool>,
    /// Explicit policy name. Unset means "infer from `replication` and `r`".
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub tie_break: TieBreak,
}

impl SystemSection {
    pub fn new(parallelism: usize, d: usize) -> Self {
        Self {
            parallelism,
            d,
            r: None,
            replication: None,
            policy: None,
            tie_break: TieBreak::default(),
        }
    }

    /// Canonical name of the routing policy this section selects.
    pub fn policy_name(&self) -> Result<&'static str, ConfigError> {
        let explicit = match self.policy.as_deref() {
            None => None,
            Some("shortest_queue") | Some("jsq") => Some("shortest_queue"),
            Some("redundancy") => Some("redundancy"),
            Some("threshold") => Some("threshold"),
            Some(other) => return Err(ConfigError::UnknownPolicy(other.to_string())),
        };

        let Some(name) = explicit else {
            return Ok(match (self.replication.unwrap_or(false), self.r) {
                (false, _) => "shortest_queue",
                (true, None) => "redundancy",
                (true, Some(_)) => "threshold",
            });
        };

        let mismatch = |why: &str| {
            Err(ConfigError::PolicyMismatch(format!("policy `{}` {}", name, why)))
        };
        match name {
            "shortest_queue" if self.replication == Some(true) => {
                mismatch("never replicates but replication = true")
            }
            "redundancy" | "threshold" if self.replication == Some(false) => {
                mismatch("replicates but replication = false")
            }
            "redundancy" if self.r.is_some() => mismatch("takes no threshold but r is set"),
            "threshold" if self.r.is_none() => mismatch("requires r"),
            _ => Ok(name),
        }
    }

    /// Build the routing policy this section selects.
    pub fn build_policy(&self) -> Result<Box<dyn RoutingPolicy>, ConfigError> {
        let name = self.policy_name()?;
        pqsim_routing::policy_by_name(name, self.r, self.tie_break)
            .ok_or_else(|| ConfigError::UnknownPolicy(name.to_string()))
    }
}

/// How long the run lasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    /// Generate arrivals forever; requires `max_time` or `max_jobs`.
    #[serde(default = "default_infinite_jobs")]
    pub infinite_jobs: bool,
    /// Arrivals to generate when `infinite_jobs` is false.
    #[serde(default)]
    pub number_jobs: u64,
    /// Stop the clock at this virtual time.
    #[serde(default)]
    pub max_time: Option<f64>,
    /// Stop generating arrivals after this many jobs.
    #[serde(default)]
    pub max_jobs: Option<u64>,
}

fn default_infinite_jobs() -> bool {
    true
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            infinite_jobs: default_infinite_jobs(),
            number_jobs: 0,
            max_time: None,
            max_jobs: None,
        }
    }
}

impl RunSection {
    /// Exactly `number_jobs` arrivals, no time limit.
    pub fn bounded(number_jobs: u64) -> Self {
        Self {
            infinite_jobs: false,
            number_jobs,
            ..Self::default()
        }
    }

    /// Unbounded arrivals until `max_time`.
    pub fn until(max_time: f64) -> Self {
        Self {
            max_time: Some(max_time),
            ..Self::default()
        }
    }

    /// Total arrivals to generate, `None` for no limit.
    pub fn arrival_limit(&self) -> Option<u64> {
        if self.infinite_jobs {
            self.max_jobs
        } else {
            Some(
                self.max_jobs
                    .map_or(self.number_jobs, |cap| cap.min(self.number_jobs)),
            )
        }
    }
}

/// Monitors attached to the run, in attachment order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorsSection {
    #[serde(default = "default_monitors")]
    pub enabled: Vec<String>,
}

fn default_monitors() -> Vec<String> {
    vec!["TimeQueueSize".to_string()]
}

impl Default for MonitorsSection {
    fn default() -> Self {
        Self {
            enabled: default_monitors(),
        }
    }
}

impl SimConfig {
    /// Build and validate a configuration in code.
    pub fn new(
        system: SystemSection,
        arrival: Distribution,
        service: Distribution,
        run: RunSection,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            simulation: SimulationSection::default(),
            system,
            arrival,
            service,
            run,
            monitors: MonitorsSection::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.simulation.seed = seed;
        self
    }

    pub fn with_monitors<I, S>(mut self, names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.monitors.enabled = names.into_iter().map(Into::into).collect();
        self.validate()?;
        Ok(self)
    }

    pub fn with_trace(mut self, record: bool) -> Self {
        self.simulation.record_trace = record;
        self
    }

    /// Validate configuration consistency.
    ///
    /// Re-run this after mutating fields directly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_structure()?;

        self.arrival.build()?;
        self.service.build()?;
        // A zero gap never moves the clock, so a timed run would not end.
        if let Distribution::Deterministic { value } = self.arrival {
            if value <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "deterministic interarrival must be > 0, got {}",
                    value
                )));
            }
        }

        let known = crate::monitor::available_monitors();
        for (i, name) in self.monitors.enabled.iter().enumerate() {
            if !known.contains(&name.as_str()) {
                return Err(ConfigError::UnknownMonitor(name.clone()));
            }
            if self.monitors.enabled[..i].contains(name) {
                return Err(ConfigError::Validation(format!(
                    "monitor {} enabled twice",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Checks on the queue system, policy selection and horizon.
    ///
    /// Engines built from explicit parts run these too; distributions and
    /// monitors are then supplied by the caller.
    pub fn validate_structure(&self) -> Result<(), ConfigError> {
        if self.system.parallelism == 0 {
            return Err(ConfigError::Validation(
                "parallelism must be > 0".to_string(),
            ));
        }
        QueueSampler::new(self.system.parallelism, self.system.d)?;
        self.system.policy_name()?;

        if self.run.infinite_jobs {
            if self.run.number_jobs > 0 {
                return Err(ConfigError::ConflictingHorizon {
                    number_jobs: self.run.number_jobs,
                });
            }
            if self.run.max_time.is_none() && self.run.max_jobs.is_none() {
                return Err(ConfigError::UnboundedWithoutLimit);
            }
        }
        if let Some(t) = self.run.max_time {
            if !(t.is_finite() && t > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "max_time must be finite and > 0, got {}",
                    t
                )));
            }
        }
        Ok(())
    }
}
