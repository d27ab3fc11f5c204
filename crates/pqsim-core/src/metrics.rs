//! Metrics collection and aggregation for simulation runs.
//!
//! Tracks per-job wait and sojourn times, throughput, replica accounting and
//! load fairness across queues.

use crate::job::JobId;
use crate::queue::ServerQueue;
use crate::replica::ReplicaStats;
use serde::{Deserialize, Serialize};

/// Per-job completion record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetric {
    pub job: JobId,
    /// Queue whose replica finished first.
    pub queue: usize,
    pub arrival_time: f64,
    pub wait: f64,
    /// Arrival to completion.
    pub sojourn: f64,
    /// Replicas the job was split into.
    pub copies: usize,
}

impl JobMetric {
    pub fn service(&self) -> f64 {
        self.sojourn - self.wait
    }
}

/// Percentile values for a distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Compute percentiles from a slice of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                p50: 0.0,
                p75: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
            p99: percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Run-level facts the collector cannot see on its own.
#[derive(Debug, Clone)]
pub struct RunTotals {
    pub policy: String,
    pub seed: u64,
    /// Virtual time at which the run stopped.
    pub end_time: f64,
    pub jobs_arrived: u64,
    pub jobs_in_flight: u64,
    pub events_processed: u64,
}

/// Aggregated metrics for an entire simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub policy: String,
    pub seed: u64,
    pub end_time: f64,
    pub jobs_arrived: u64,
    pub jobs_completed: u64,
    /// Jobs still unresolved when the run stopped.
    pub jobs_in_flight: u64,
    pub events_processed: u64,

    // Latency
    pub wait: Percentiles,
    pub sojourn: Percentiles,

    /// Completed jobs per unit of virtual time.
    pub throughput: f64,
    /// Mean replicas per completed job.
    pub mean_copies: f64,
    pub replicas: ReplicaStats,

    // Fairness
    pub per_queue_completed: Vec<u64>,
    pub load_cv: f64,
    pub jains_fairness_index: f64,
}

/// Collector that accumulates per-job metrics during simulation.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    records: Vec<JobMetric>,
    /// Number of completions to discard at the start.
    warmup_count: u64,
}

impl MetricsCollector {
    pub fn new(warmup_count: u64) -> Self {
        Self {
            records: Vec::new(),
            warmup_count,
        }
    }

    /// Record a completed job.
    pub fn record(&mut self, metric: JobMetric) {
        self.records.push(metric);
    }

    /// Number of completed jobs recorded, warmup included.
    pub fn completed_count(&self) -> u64 {
        self.records.len() as u64
    }

    /// Post-warmup records, in completion order.
    pub fn records(&self) -> &[JobMetric] {
        let skip = self.warmup_count as usize;
        if skip >= self.records.len() {
            return &[];
        }
        &self.records[skip..]
    }

    /// Aggregate all metrics into a summary.
    ///
    /// If the warmup swallows every completion, latency and throughput
    /// figures are zero and a warning is logged.
    pub fn aggregate(
        &self,
        totals: RunTotals,
        queues: &[ServerQueue],
        replicas: &ReplicaStats,
    ) -> RunSummary {
        let records = self.records();

        if records.is_empty() && !self.records.is_empty() {
            tracing::warn!(
                warmup = self.warmup_count,
                completed = self.records.len(),
                "warmup_jobs covers every completed job; latency metrics will be zero"
            );
        }

        let waits: Vec<f64> = records.iter().map(|r| r.wait).collect();
        let sojourns: Vec<f64> = records.iter().map(|r| r.sojourn).collect();
        let completed = records.len() as u64;

        let throughput = if totals.end_time > 0.0 {
            completed as f64 / totals.end_time
        } else {
            0.0
        };
        let mean_copies = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.copies as f64).sum::<f64>() / records.len() as f64
        };

        let per_queue_completed: Vec<u64> = queues.iter().map(|q| q.total_completed).collect();

        RunSummary {
            policy: totals.policy,
            seed: totals.seed,
            end_time: totals.end_time,
            jobs_arrived: totals.jobs_arrived,
            jobs_completed: self.completed_count(),
            jobs_in_flight: totals.jobs_in_flight,
            events_processed: totals.events_processed,
            wait: Percentiles::from_values(&waits),
            sojourn: Percentiles::from_values(&sojourns),
            throughput,
            mean_copies,
            replicas: replicas.clone(),
            load_cv: coefficient_of_variation(&per_queue_completed),
            jains_fairness_index: jains_fairness_index(&per_queue_completed),
            per_queue_completed,
        }
    }
}

/// Coefficient of variation (std / mean).
fn coefficient_of_variation(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<u64>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}

/// Jain's fairness index: (sum(x_i))^2 / (n * sum(x_i^2)).
fn jains_fairness_index(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    let sum_sq: f64 = values.iter().map(|&v| (v as f64).powi(2)).sum();
    if sum_sq == 0.0 {
        return 1.0;
    }
    (sum * sum) / (n * sum_sq)
}

/// Format a summary as a pretty-printed table string.
pub fn format_table(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} Results  ", summary.policy)
    ));
    out.push_str(&format!(
        "  Seed: {} | End time: {:.2} | Events: {}\n",
        summary.seed, summary.end_time, summary.events_processed
    ));
    out.push_str(&format!(
        "  Jobs: {} arrived, {} completed, {} in flight\n",
        summary.jobs_arrived, summary.jobs_completed, summary.jobs_in_flight
    ));
    out.push_str(&format!("{:-<70}\n", "  Latency  "));
    out.push_str(&format!(
        "  Wait       mean={:>8.3}  P50={:>8.3}  P90={:>8.3}  P99={:>8.3}\n",
        summary.wait.mean, summary.wait.p50, summary.wait.p90, summary.wait.p99
    ));
    out.push_str(&format!(
        "  Sojourn    mean={:>8.3}  P50={:>8.3}  P90={:>8.3}  P99={:>8.3}\n",
        summary.sojourn.mean, summary.sojourn.p50, summary.sojourn.p90, summary.sojourn.p99
    ));
    out.push_str(&format!("{:-<70}\n", "  Replicas  "));
    out.push_str(&format!(
        "  Created: {}  Completed: {}  Cancelled: {} ({} waiting, {} in service)\n",
        summary.replicas.created,
        summary.replicas.completed,
        summary.replicas.cancelled(),
        summary.replicas.cancelled_waiting,
        summary.replicas.cancelled_in_service,
    ));
    out.push_str(&format!(
        "  Copies/job: {:.2}  Races absorbed: {}\n",
        summary.mean_copies, summary.replicas.races_absorbed
    ));
    out.push_str(&format!("{:-<70}\n", "  Throughput & Fairness  "));
    out.push_str(&format!(
        "  Jobs/time: {:.3}  Load CV: {:.3}  Jain's index: {:.4}\n",
        summary.throughput, summary.load_cv, summary.jains_fairness_index,
    ));
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of several runs.
pub fn format_comparison_table(results: &[RunSummary]) -> String {
    if results.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("\n{:=<90}\n", "  Policy Comparison  "));
    out.push_str(&format!(
        "{:<18} {:>9} {:>9} {:>9} {:>9} {:>9} {:>8} {:>8}\n",
        "Policy", "Wait avg", "Soj p50", "Soj p99", "Soj avg", "Jobs/t", "Copies", "Jain's"
    ));
    out.push_str(&format!("{:-<90}\n", ""));

    for s in results {
        out.push_str(&format!(
            "{:<18} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>8.2} {:>8.4}\n",
            s.policy,
            s.wait.mean,
            s.sojourn.p50,
            s.sojourn.p99,
            s.sojourn.mean,
            s.throughput,
            s.mean_copies,
            s.jains_fairness_index,
        ));
    }
    out.push_str(&format!("{:=<90}\n", ""));
    out
}
