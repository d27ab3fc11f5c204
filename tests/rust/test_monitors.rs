/// Integration tests for monitors attached to full runs.
use pqsim_core::config::SimConfig;
use pqsim_core::monitor::{EventKind, Monitor, MonitorError, MonitorEvent, MonitorOutput};
use pqsim_core::{JobId, SimulationEngine};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn config(monitors: &str) -> SimConfig {
    SimConfig::from_str(&format!(
        r#"
[simulation]
seed = 42

[system]
parallelism = 8
d = 2
r = 1
replication = true

[arrival]
kind = "exponential"
rate = 4.0

[service]
kind = "exponential"
rate = 1.0

[run]
infinite_jobs = false
number_jobs = 300

[monitors]
enabled = [{}]
"#,
        monitors
    ))
    .unwrap()
}

fn run(config: SimConfig) -> SimulationEngine {
    let mut engine = SimulationEngine::new(config).unwrap();
    engine.run();
    engine
}

#[test]
fn test_all_builtin_monitors_agree() {
    let engine = run(config(
        r#""TimeQueueSize", "ReplicaSets", "JobTime", "JobTotal", "ReplicaClassCounts""#,
    ));
    let monitors = engine.monitors();
    let names: Vec<&str> = monitors.names().collect();
    assert_eq!(
        names,
        vec!["TimeQueueSize", "ReplicaSets", "JobTime", "JobTotal", "ReplicaClassCounts"]
    );

    let jobs = monitors.job_table().unwrap();
    assert_eq!(jobs.len(), 300);

    let totals = match monitors.output("JobTotal") {
        Some(MonitorOutput::JobTotal(totals)) => totals,
        other => panic!("unexpected output {:?}", other),
    };
    assert_eq!(totals.len(), 300);
    for (row, total) in jobs.rows.iter().zip(&totals) {
        assert_eq!(row.job, total.job);
        assert!((row.exit - row.entry - total.total).abs() < 1e-9);
    }

    let sets = match monitors.output("ReplicaSets") {
        Some(MonitorOutput::ReplicaSets(sets)) => sets,
        other => panic!("unexpected output {:?}", other),
    };
    assert_eq!(sets.len(), 300);
    for (set, row) in sets.iter().zip(&jobs.rows) {
        assert_eq!(set.job, row.job);
        assert_eq!(set.entry, row.entry);
        assert_eq!(set.exit, Some(row.exit));
        assert!(!set.choices.is_empty() && set.choices.len() <= 2);
    }

    let counts = match monitors.output("ReplicaClassCounts") {
        Some(MonitorOutput::ReplicaClassCounts(counts)) => counts,
        other => panic!("unexpected output {:?}", other),
    };
    assert_eq!(counts.values().sum::<u64>(), 300);
    assert!(counts.keys().all(|&k| k == 1 || k == 2));

    let table = monitors.occupancy_table().unwrap();
    assert!(table.rows.windows(2).all(|w| w[0].time < w[1].time));
    assert!(table.rows.iter().all(|r| r.waiting.len() == 8));
    // The system drains completely.
    assert_eq!(table.totals().last(), Some(&0));
}

#[test]
fn test_missing_monitor_errors() {
    let engine = run(config(r#""JobTotal""#));
    assert_eq!(
        engine.monitors().occupancy_table(),
        Err(MonitorError::Required {
            monitor: "TimeQueueSize",
            output: "occupancy table",
        })
    );
    assert_eq!(
        engine.monitors().job_table(),
        Err(MonitorError::Required {
            monitor: "JobTime",
            output: "job table",
        })
    );
    assert!(engine.monitors().output("ReplicaSets").is_none());
}

#[test]
fn test_no_monitors_same_run() {
    let with = run(config(r#""TimeQueueSize", "JobTime""#));
    let without = run(config(""));
    assert!(without.monitors().is_empty());
    // Observation never changes the simulation.
    assert_eq!(with.draws(), without.draws());
    assert_eq!(with.clock.now(), without.clock.now());
    assert_eq!(
        with.summary().sojourn.mean,
        without.summary().sojourn.mean
    );
}

/// Counts events per kind into shared storage so the test can read them.
#[derive(Debug)]
struct Counter {
    seen: Arc<Mutex<BTreeMap<&'static str, u64>>>,
    last_time: f64,
}

impl Monitor for Counter {
    fn name(&self) -> &str {
        "Counter"
    }

    fn consumes(&self, kind: EventKind) -> bool {
        kind != EventKind::QueueSnapshot
    }

    fn add(&mut self, event: &MonitorEvent) {
        assert!(event.time() >= self.last_time, "events out of time order");
        self.last_time = event.time();
        let key = match event.kind() {
            EventKind::Routed => "routed",
            EventKind::JobCompleted => "completed",
            EventKind::QueueSnapshot => panic!("snapshot delivered to a non-consumer"),
        };
        if let Ok(mut seen) = self.seen.lock() {
            *seen.entry(key).or_insert(0) += 1;
        }
    }

    fn output(&self) -> MonitorOutput {
        MonitorOutput::ReplicaClassCounts(BTreeMap::new())
    }
}

#[test]
fn test_custom_monitor() {
    let seen = Arc::new(Mutex::new(BTreeMap::new()));
    let mut engine = SimulationEngine::new(config("")).unwrap();
    engine.attach_monitor(Box::new(Counter {
        seen: Arc::clone(&seen),
        last_time: 0.0,
    }));
    engine.run();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.get("routed"), Some(&300));
    assert_eq!(seen.get("completed"), Some(&300));
    assert_eq!(engine.monitors().names().collect::<Vec<_>>(), vec!["Counter"]);
}

#[test]
fn test_outputs_serialize_to_json() {
    let engine = run(config(r#""JobTotal", "ReplicaSets""#));
    let outputs: BTreeMap<String, MonitorOutput> =
        engine.monitors().outputs().into_iter().collect();
    let json = serde_json::to_value(&outputs).unwrap();

    let totals = json["JobTotal"]["data"].as_array().unwrap();
    assert_eq!(totals.len(), 300);
    assert_eq!(totals[0]["job"], serde_json::json!(JobId(1).0));
    assert_eq!(json["ReplicaSets"]["monitor"], "ReplicaSets");
}

#[test]
fn test_trace_file_round_trip() {
    let engine = run(config("").with_trace(true));
    let trace = engine.trace().unwrap();
    assert!(!trace.is_empty());

    let path = std::env::temp_dir().join(format!("pqsim-trace-{}.jsonl", std::process::id()));
    pqsim_core::trace::save_jsonl(trace, &path).unwrap();
    let loaded = pqsim_core::trace::load_jsonl(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.as_slice(), trace);
}
