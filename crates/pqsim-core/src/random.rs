//! Seeded random streams for arrivals, service times and routing draws.
//!
//! One [`RandomStreams`] instance owns the run's only generator. Every draw
//! (interarrival gaps, service durations, queue sampling and tie-breaks) is
//! taken from it in event order, so a seed fully determines a run.

use pqsim_routing::Chooser;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as _, Exp, Gamma, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    #[error("{kind}: `{param}` must be {expected}, got {value}")]
    InvalidParameter {
        kind: &'static str,
        param: &'static str,
        expected: &'static str,
        value: f64,
    },
}

/// A pluggable duration distribution.
///
/// Implementations must return finite, non-negative durations; anything else
/// aborts the run when drawn.
pub trait DurationSampler: fmt::Debug + Send + Sync {
    fn sample(&self, rng: &mut dyn RngCore) -> f64;
}

/// Built-in duration distributions, as they appear in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Exponential { rate: f64 },
    Deterministic { value: f64 },
    Uniform { low: f64, high: f64 },
    Gamma { shape: f64, scale: f64 },
    Hyperexponential { rate_low: f64, rate_high: f64, p_low: f64 },
}

impl Distribution {
    /// Exponential distribution with the given mean.
    pub fn exponential_mean(mean: f64) -> Self {
        Distribution::Exponential { rate: 1.0 / mean }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Distribution::Exponential { .. } => "exponential",
            Distribution::Deterministic { .. } => "deterministic",
            Distribution::Uniform { .. } => "uniform",
            Distribution::Gamma { .. } => "gamma",
            Distribution::Hyperexponential { .. } => "hyperexponential",
        }
    }

    /// Expected value of a draw.
    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Exponential { rate } => 1.0 / rate,
            Distribution::Deterministic { value } => value,
            Distribution::Uniform { low, high } => (low + high) / 2.0,
            Distribution::Gamma { shape, scale } => shape * scale,
            Distribution::Hyperexponential {
                rate_low,
                rate_high,
                p_low,
            } => p_low / rate_low + (1.0 - p_low) / rate_high,
        }
    }

    /// Check parameters and build the sampler used during the run.
    pub fn build(&self) -> Result<Sampler, DistributionError> {
        let kind = self.kind();
        match *self {
            Distribution::Exponential { rate } => Ok(Sampler::Exponential(exp(kind, "rate", rate)?)),
            Distribution::Deterministic { value } => {
                require(kind, "value", value, value.is_finite() && value >= 0.0, "finite and >= 0")?;
                Ok(Sampler::Deterministic(value))
            }
            Distribution::Uniform { low, high } => {
                require(kind, "low", low, low.is_finite() && low >= 0.0, "finite and >= 0")?;
                require(kind, "high", high, high.is_finite() && high > low, "finite and > low")?;
                Ok(Sampler::Uniform(Uniform::new(low, high)))
            }
            Distribution::Gamma { shape, scale } => {
                require(kind, "shape", shape, shape.is_finite() && shape > 0.0, "finite and > 0")?;
                require(kind, "scale", scale, scale.is_finite() && scale > 0.0, "finite and > 0")?;
                Gamma::new(shape, scale)
                    .map(Sampler::Gamma)
                    .map_err(|_| DistributionError::InvalidParameter {
                        kind,
                        param: "shape",
                        expected: "a valid gamma parameterisation",
                        value: shape,
                    })
            }
            Distribution::Hyperexponential {
                rate_low,
                rate_high,
                p_low,
            } => {
                require(kind, "p_low", p_low, (0.0..=1.0).contains(&p_low), "in [0, 1]")?;
                Ok(Sampler::Hyperexponential {
                    low: exp(kind, "rate_low", rate_low)?,
                    high: exp(kind, "rate_high", rate_high)?,
                    p_low,
                })
            }
        }
    }
}

fn require(
    kind: &'static str,
    param: &'static str,
    value: f64,
    ok: bool,
    expected: &'static str,
) -> Result<(), DistributionError> {
    if ok {
        Ok(())
    } else {
        Err(DistributionError::InvalidParameter {
            kind,
            param,
            expected,
            value,
        })
    }
}

fn exp(kind: &'static str, param: &'static str, rate: f64) -> Result<Exp<f64>, DistributionError> {
    require(kind, param, rate, rate.is_finite() && rate > 0.0, "finite and > 0")?;
    Exp::new(rate).map_err(|_| DistributionError::InvalidParameter {
        kind,
        param,
        expected: "finite and > 0",
        value: rate,
    })
}

/// A validated built-in distribution, ready to draw from.
#[derive(Debug, Clone)]
pub enum Sampler {
    Exponential(Exp<f64>),
    Deterministic(f64),
    Uniform(Uniform<f64>),
    Gamma(Gamma<f64>),
    Hyperexponential {
        low: Exp<f64>,
        high: Exp<f64>,
        p_low: f64,
    },
}

impl DurationSampler for Sampler {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        match self {
            Sampler::Exponential(d) => d.sample(rng),
            Sampler::Deterministic(value) => *value,
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Gamma(d) => d.sample(rng),
            Sampler::Hyperexponential { low, high, p_low } => {
                // Branch draw first, then the phase draw.
                if rng.gen::<f64>() < *p_low {
                    low.sample(rng)
                } else {
                    high.sample(rng)
                }
            }
        }
    }
}

/// The run's single seeded generator plus its arrival and service samplers.
pub struct RandomStreams {
    seed: u64,
    rng: ChaCha8Rng,
    arrival: Box<dyn DurationSampler>,
    service: Box<dyn DurationSampler>,
    draws: u64,
}

impl RandomStreams {
    pub fn new(
        seed: u64,
        arrival: Box<dyn DurationSampler>,
        service: Box<dyn DurationSampler>,
    ) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            arrival,
            service,
            draws: 0,
        }
    }

    /// Build streams from two built-in distributions.
    pub fn from_distributions(
        seed: u64,
        arrival: &Distribution,
        service: &Distribution,
    ) -> Result<Self, DistributionError> {
        Ok(Self::new(
            seed,
            Box::new(arrival.build()?),
            Box::new(service.build()?),
        ))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of draw operations taken so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Next gap between two arrivals.
    pub fn interarrival(&mut self) -> f64 {
        self.draws += 1;
        let gap = self.arrival.sample(&mut self.rng);
        checked_duration("interarrival", gap)
    }

    /// Next service duration.
    pub fn service_time(&mut self) -> f64 {
        self.draws += 1;
        let duration = self.service.sample(&mut self.rng);
        checked_duration("service", duration)
    }

    /// Uniform integer in `0..bound`.
    ///
    /// Drawn over `u64` so the value does not depend on the host's pointer
    /// width.
    pub fn below(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "below: empty range");
        self.draws += 1;
        self.rng.gen_range(0..bound as u64) as usize
    }

    /// `d` distinct indices from `0..n`, uniformly, in draw order.
    ///
    /// Partial Fisher-Yates over a virtual identity array; only displaced
    /// slots are materialised, so the cost is O(d) regardless of `n`.
    pub fn sample_indices(&mut self, n: usize, d: usize) -> Vec<usize> {
        assert!(d <= n, "cannot sample {} of {} indices", d, n);
        let mut displaced: HashMap<usize, usize> = HashMap::with_capacity(d);
        let mut picked = Vec::with_capacity(d);
        for i in 0..d {
            let j = i + self.below(n - i);
            let at_j = displaced.get(&j).copied().unwrap_or(j);
            let at_i = displaced.get(&i).copied().unwrap_or(i);
            displaced.insert(j, at_i);
            picked.push(at_j);
        }
        picked
    }
}

impl Chooser for RandomStreams {
    fn choose(&mut self, len: usize) -> usize {
        self.below(len)
    }
}

impl fmt::Debug for RandomStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomStreams")
            .field("seed", &self.seed)
            .field("arrival", &self.arrival)
            .field("service", &self.service)
            .field("draws", &self.draws)
            .finish()
    }
}

fn checked_duration(what: &str, value: f64) -> f64 {
    assert!(
        value.is_finite() && value >= 0.0,
        "{} sampler produced an invalid duration: {}",
        what,
        value
    );
    value
}
