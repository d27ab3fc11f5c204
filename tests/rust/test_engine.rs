/// Integration tests for the simulation engine.
use pqsim_core::config::SimConfig;
use pqsim_core::{JobId, SimulationEngine, TraceEvent};
use std::collections::{BTreeMap, HashMap};

fn replicated_config(seed: u64, r: Option<usize>) -> SimConfig {
    let threshold = r.map(|r| format!("r = {}", r)).unwrap_or_default();
    SimConfig::from_str(&format!(
        r#"
[simulation]
name = "integration-test"
seed = {}
record_trace = true

[system]
parallelism = 10
d = 3
replication = true
{}

[arrival]
kind = "exponential"
rate = 6.0

[service]
kind = "exponential"
rate = 1.0

[run]
infinite_jobs = false
number_jobs = 500

[monitors]
enabled = ["TimeQueueSize", "ReplicaSets", "JobTime", "JobTotal"]
"#,
        seed, threshold
    ))
    .unwrap()
}

fn run(config: SimConfig) -> SimulationEngine {
    let mut engine = SimulationEngine::new(config).unwrap();
    engine.run();
    engine
}

#[test]
fn test_same_seed_same_run() {
    let a = run(replicated_config(1234, None));
    let b = run(replicated_config(1234, None));

    assert_eq!(a.trace(), b.trace());
    assert_eq!(a.monitors().outputs(), b.monitors().outputs());
    assert_eq!(a.draws(), b.draws());
    assert_eq!(a.clock.now(), b.clock.now());
}

#[test]
fn test_different_seed_different_run() {
    let a = run(replicated_config(1, None));
    let b = run(replicated_config(2, None));
    assert_ne!(a.trace(), b.trace());
}

#[test]
fn test_every_job_resolves_exactly_once() {
    for r in [None, Some(0), Some(2)] {
        let engine = run(replicated_config(77, r));
        let trace = engine.trace().unwrap();

        let mut finished: HashMap<JobId, usize> = HashMap::new();
        let mut copies: HashMap<JobId, usize> = HashMap::new();
        let mut resolved_replicas: HashMap<JobId, usize> = HashMap::new();
        for event in trace {
            match event {
                TraceEvent::Arrival { job, copies: c, .. } => {
                    copies.insert(*job, *c);
                }
                TraceEvent::Finished { replica, .. } => {
                    *finished.entry(replica.job).or_insert(0) += 1;
                    *resolved_replicas.entry(replica.job).or_insert(0) += 1;
                }
                TraceEvent::Interrupted { replica, .. } => {
                    *resolved_replicas.entry(replica.job).or_insert(0) += 1;
                }
                TraceEvent::Waited { .. } => {}
            }
        }

        assert_eq!(copies.len(), 500, "r = {:?}", r);
        assert!(finished.values().all(|&n| n == 1), "r = {:?}", r);
        assert_eq!(finished.len(), 500, "r = {:?}", r);
        // Every replica either finished or was interrupted.
        assert_eq!(resolved_replicas, copies, "r = {:?}", r);
        assert_eq!(engine.replicas().replicas_in_flight(), 0);
        assert_eq!(engine.replicas().jobs_in_flight(), 0);
    }
}

#[test]
fn test_single_occupancy_throughout() {
    let mut engine = SimulationEngine::new(replicated_config(5, Some(1))).unwrap();
    while engine.step() {
        for queue in engine.queues() {
            assert!(queue.in_service() <= 1);
        }
        engine.replicas().assert_consistent();
    }
}

#[test]
fn test_fifo_grants_per_queue() {
    let engine = run(replicated_config(31, None));
    let trace = engine.trace().unwrap();

    let arrivals: HashMap<JobId, f64> = trace
        .iter()
        .filter_map(|e| match e {
            TraceEvent::Arrival { time, job, .. } => Some((*job, *time)),
            _ => None,
        })
        .collect();

    // Replicas are granted a server in the order they joined its queue.
    let mut grants: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for event in trace {
        if let TraceEvent::Waited { replica, .. } = event {
            grants
                .entry(replica.queue)
                .or_default()
                .push(arrivals[&replica.job]);
        }
    }
    for (queue, joined) in grants {
        assert!(
            joined.windows(2).all(|w| w[0] <= w[1]),
            "queue {} granted out of order",
            queue
        );
    }
}

#[test]
fn test_waits_match_grant_times() {
    let engine = run(replicated_config(8, Some(1)));
    let trace = engine.trace().unwrap();
    let arrivals: HashMap<JobId, f64> = trace
        .iter()
        .filter_map(|e| match e {
            TraceEvent::Arrival { time, job, .. } => Some((*job, *time)),
            _ => None,
        })
        .collect();

    for event in trace {
        if let TraceEvent::Waited {
            time,
            replica,
            wait,
        } = event
        {
            assert_eq!(*wait, *time - arrivals[&replica.job]);
            assert!(*wait >= 0.0);
        }
    }
}

#[test]
fn test_trace_times_non_decreasing() {
    let engine = run(replicated_config(3, Some(0)));
    let times: Vec<f64> = engine.trace().unwrap().iter().map(|e| e.time()).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_redundancy_occupancy_table_is_reproducible() {
    let config = || {
        SimConfig::from_str(
            r#"
[simulation]
seed = 1234

[system]
parallelism = 100
d = 2
replication = true

[arrival]
kind = "exponential"
rate = 50.0

[service]
kind = "exponential"
rate = 1.0

[run]
max_time = 100.0

[monitors]
enabled = ["TimeQueueSize"]
"#,
        )
        .unwrap()
    };

    let mut first = SimulationEngine::new(config()).unwrap();
    first.run();
    let mut second = SimulationEngine::new(config()).unwrap();
    second.run();

    let a = first.monitors().occupancy_table().unwrap();
    let b = second.monitors().occupancy_table().unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
    assert!(a.rows.iter().all(|row| row.waiting.len() == 100));
    assert!(a.rows.iter().all(|row| row.time < 100.0));
    assert_eq!(first.clock.now(), 100.0);
}

#[test]
fn test_compare_policies_shares_seed() {
    let config = replicated_config(99, Some(1));
    let results =
        pqsim_core::compare_policies(&config, &["shortest_queue", "redundancy", "threshold"])
            .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].policy, "shortest_queue");
    assert_eq!(results[1].policy, "redundancy");
    assert_eq!(results[2].policy, "threshold");
    for summary in &results {
        assert_eq!(summary.seed, 99);
        assert_eq!(summary.jobs_completed, 500);
    }
    // JSQ never replicates; redundancy-3 always does.
    assert_eq!(results[0].mean_copies, 1.0);
    assert_eq!(results[1].mean_copies, 3.0);
    assert_eq!(results[0].replicas.cancelled(), 0);
}

#[test]
fn test_compare_without_threshold() {
    let config = replicated_config(12, None);
    let results =
        pqsim_core::compare_policies(&config, &["redundancy", "jsq"]).unwrap();
    assert_eq!(results[0].policy, "redundancy");
    assert_eq!(results[1].policy, "shortest_queue");
    assert!(results.iter().all(|s| s.jobs_completed == 500));

    // A threshold run needs r.
    assert!(matches!(
        pqsim_core::compare_policies(&config, &["threshold"]),
        Err(pqsim_core::ConfigError::PolicyMismatch(_))
    ));
}

#[test]
fn test_default_comparison_list() {
    let without_r = replicated_config(12, None);
    assert_eq!(
        pqsim_core::comparable_policies(&without_r),
        vec!["shortest_queue", "redundancy"]
    );

    let with_r = replicated_config(12, Some(0));
    let names = pqsim_core::comparable_policies(&with_r);
    assert_eq!(names, vec!["shortest_queue", "redundancy", "threshold"]);
    let results = pqsim_core::compare_policies(&with_r, &names).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[1].mean_copies, 3.0);
    assert!(results[2].mean_copies >= 1.0 && results[2].mean_copies <= 3.0);
}

#[test]
fn test_compare_unknown_policy_fails() {
    let config = replicated_config(1, None);
    assert!(pqsim_core::compare_policies(&config, &["round_robin"]).is_err());
}

#[test]
fn test_sweep_arrival_rates() {
    let config = replicated_config(4, None);
    let results = pqsim_core::sweep_arrival_rates(&config, &[1.0, 8.0]).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, 1.0);
    // Heavier load means longer waits on the same seed.
    assert!(results[1].1.wait.mean > results[0].1.wait.mean);
}
