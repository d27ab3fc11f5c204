//! pqsim CLI: compare parallel-queue routing policies.

use clap::{Parser, Subcommand};
use pqsim_core::config::SimConfig;
use pqsim_core::monitor::MonitorOutput;
use pqsim_core::{metrics, trace, RunSummary, SimulationEngine};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pqsim",
    about = "Simulate load balancing over parallel single-server queues",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulation.
    Run {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Override the configured seed.
        #[arg(short, long)]
        seed: Option<u64>,
        /// Output summary and monitor stores to a JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the event trace to a JSONL file.
        #[arg(short, long)]
        trace: Option<PathBuf>,
        /// Print every trace line as the run proceeds.
        #[arg(long)]
        print: bool,
    },
    /// Compare routing policies on the same config and seed.
    Compare {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated list of policy names.
        #[arg(short = 'P', long, value_delimiter = ',')]
        policies: Vec<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep exponential arrival rates.
    Sweep {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated list of arrival rates.
        #[arg(long, value_delimiter = ',')]
        rates: Vec<f64>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List available routing policies.
    ListPolicies,
    /// List available monitors.
    ListMonitors,
}

#[derive(Serialize)]
struct RunReport<'a> {
    summary: &'a RunSummary,
    monitors: BTreeMap<String, MonitorOutput>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,pqsim_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            seed,
            output,
            trace: trace_path,
            print,
        } => {
            let mut sim_config = load_config(&config);
            if let Some(seed) = seed {
                sim_config = sim_config.with_seed(seed);
            }
            if trace_path.is_some() || print {
                sim_config = sim_config.with_trace(true);
            }

            let mut engine = SimulationEngine::new(sim_config).unwrap_or_else(|e| {
                eprintln!("Error building simulation: {}", e);
                std::process::exit(1);
            });
            let result = engine.run();

            if print {
                for event in engine.trace().unwrap_or_default() {
                    println!("{}", event);
                }
            }
            println!("{}", metrics::format_table(&result));

            if let Some(trace_path) = trace_path {
                let events = engine.trace().unwrap_or_default();
                trace::save_jsonl(events, &trace_path).unwrap_or_else(|e| {
                    eprintln!("Error writing trace: {}", e);
                    std::process::exit(1);
                });
                println!("Trace written to {}", trace_path.display());
            }

            if let Some(output_path) = output {
                let report = RunReport {
                    summary: &result,
                    monitors: engine.monitors().outputs().into_iter().collect(),
                };
                write_json(&report, &output_path);
            }
        }
        Commands::Compare {
            config,
            policies,
            output,
        } => {
            let sim_config = load_config(&config);
            let names: Vec<&str> = if policies.is_empty() {
                pqsim_core::comparable_policies(&sim_config)
            } else {
                policies.iter().map(|s| s.as_str()).collect()
            };

            let results =
                pqsim_core::compare_policies(&sim_config, &names).unwrap_or_else(|e| {
                    eprintln!("Error running comparison: {}", e);
                    std::process::exit(1);
                });
            println!("{}", metrics::format_comparison_table(&results));

            for result in &results {
                println!("{}", metrics::format_table(result));
            }

            if let Some(output_path) = output {
                write_json(&results, &output_path);
            }
        }
        Commands::Sweep {
            config,
            rates,
            output,
        } => {
            let sim_config = load_config(&config);
            let results =
                pqsim_core::sweep_arrival_rates(&sim_config, &rates).unwrap_or_else(|e| {
                    eprintln!("Error running sweep: {}", e);
                    std::process::exit(1);
                });

            for (rate, result) in &results {
                println!(
                    "Rate {:.3}: wait mean={:.3} | sojourn p50={:.3} p99={:.3} | {:.3} jobs/time | {} in flight",
                    rate,
                    result.wait.mean,
                    result.sojourn.p50,
                    result.sojourn.p99,
                    result.throughput,
                    result.jobs_in_flight,
                );
            }

            if let Some(output_path) = output {
                let summaries: Vec<&RunSummary> = results.iter().map(|(_, s)| s).collect();
                write_json(&summaries, &output_path);
            }
        }
        Commands::ListPolicies => {
            println!("Available routing policies:");
            for name in pqsim_routing::available_policies() {
                println!("  - {}", name);
            }
        }
        Commands::ListMonitors => {
            println!("Available monitors:");
            for name in pqsim_core::monitor::available_monitors() {
                println!("  - {}", name);
            }
        }
    }
}

fn load_config(path: &Path) -> SimConfig {
    SimConfig::from_file(path).unwrap_or_else(|e| {
        eprintln!("Error loading config: {}", e);
        std::process::exit(1);
    })
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error encoding output: {}", e);
        std::process::exit(1);
    });
    std::fs::write(path, json).unwrap_or_else(|e| {
        eprintln!("Error writing output: {}", e);
        std::process::exit(1);
    });
    println!("Results written to {}", path.display());
}
