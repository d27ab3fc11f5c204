/// Cross-check the engine against a minimal hand-written event loop.
///
/// Scenario: two queues, both sampled, join-shortest-queue with random
/// tie-breaks, five jobs, exponential arrivals at rate 1 and exponential
/// service with mean 10. The reference loop below knows nothing about
/// replicas, monitors or policies; it only shares the random stream and
/// the order in which draws are taken.
use pqsim_core::config::SimConfig;
use pqsim_core::random::{Distribution, RandomStreams};
use pqsim_core::{JobId, ReplicaKey, SimulationEngine, TraceEvent};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

const SEED: u64 = 2718;
const JOBS: u64 = 5;

#[derive(Debug, Clone, Copy)]
enum Step {
    Tick,
    Route(u64),
    Start(u64, usize),
    Done(u64, usize),
}

struct At(f64, u64, Step);

impl PartialEq for At {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for At {}
impl PartialOrd for At {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for At {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.total_cmp(&self.0).then(other.1.cmp(&self.1))
    }
}

/// (time, job, queue, value) for every "Waited" and "Finished" line.
type Lines = (Vec<(f64, u64, usize, f64)>, Vec<(f64, u64, usize, f64)>);

fn reference_run() -> Lines {
    let mut streams = RandomStreams::from_distributions(
        SEED,
        &Distribution::Exponential { rate: 1.0 },
        &Distribution::exponential_mean(10.0),
    )
    .unwrap();

    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;
    let mut push = |heap: &mut BinaryHeap<At>, t: f64, step: Step| {
        heap.push(At(t, seq, step));
        seq += 1;
    };

    let mut busy: [Option<u64>; 2] = [None, None];
    let mut waiting: [VecDeque<u64>; 2] = [VecDeque::new(), VecDeque::new()];
    let mut arrival = vec![0.0; JOBS as usize + 1];
    let mut spawned = 0u64;
    let (mut waited, mut finished) = (Vec::new(), Vec::new());

    push(&mut heap, 0.0, Step::Tick);
    while let Some(At(now, _, step)) = heap.pop() {
        match step {
            Step::Tick => {
                if spawned == JOBS {
                    continue;
                }
                spawned += 1;
                arrival[spawned as usize] = now;
                push(&mut heap, now, Step::Route(spawned));
                let gap = streams.interarrival();
                push(&mut heap, now + gap, Step::Tick);
            }
            Step::Route(job) => {
                let len = |q: usize| waiting[q].len() + usize::from(busy[q].is_some());
                let q = match len(0).cmp(&len(1)) {
                    Ordering::Less => 0,
                    Ordering::Greater => 1,
                    Ordering::Equal => streams.below(2),
                };
                if busy[q].is_none() {
                    busy[q] = Some(job);
                    push(&mut heap, now, Step::Start(job, q));
                } else {
                    waiting[q].push_back(job);
                }
            }
            Step::Start(job, q) => {
                waited.push((now, job, q, now - arrival[job as usize]));
                let service = streams.service_time();
                push(&mut heap, now + service, Step::Done(job, q));
            }
            Step::Done(job, q) => {
                finished.push((now, job, q, now - arrival[job as usize]));
                busy[q] = waiting[q].pop_front();
                if let Some(next) = busy[q] {
                    push(&mut heap, now, Step::Start(next, q));
                }
            }
        }
    }
    (waited, finished)
}

fn engine_run() -> Lines {
    let config = SimConfig::from_str(&format!(
        r#"
[simulation]
seed = {}
record_trace = true

[system]
parallelism = 2
d = 2
tie_break = "random"

[arrival]
kind = "exponential"
rate = 1.0

[service]
kind = "exponential"
rate = 0.1

[run]
infinite_jobs = false
number_jobs = {}
"#,
        SEED, JOBS
    ))
    .unwrap();
    let mut engine = SimulationEngine::new(config).unwrap();
    let summary = engine.run();
    assert_eq!(summary.jobs_completed, JOBS);

    let unpack = |key: &ReplicaKey| (key.job.0, key.queue);
    let (mut waited, mut finished) = (Vec::new(), Vec::new());
    for event in engine.trace().unwrap() {
        match event {
            TraceEvent::Waited {
                time,
                replica,
                wait,
            } => {
                let (job, q) = unpack(replica);
                waited.push((*time, job, q, *wait));
            }
            TraceEvent::Finished {
                time,
                replica,
                total,
            } => {
                let (job, q) = unpack(replica);
                finished.push((*time, job, q, *total));
            }
            TraceEvent::Arrival { job, copies, .. } => {
                assert!(*job <= JobId(JOBS));
                assert_eq!(*copies, 1);
            }
            TraceEvent::Interrupted { .. } => panic!("no replication in this scenario"),
        }
    }
    (waited, finished)
}

#[test]
fn test_engine_matches_reference_loop() {
    let (ref_waited, ref_finished) = reference_run();
    let (waited, finished) = engine_run();

    assert_eq!(ref_waited.len(), JOBS as usize);
    assert_eq!(ref_finished.len(), JOBS as usize);
    assert_eq!(waited, ref_waited);
    assert_eq!(finished, ref_finished);
}

#[test]
fn test_reference_loop_is_deterministic() {
    assert_eq!(reference_run(), reference_run());
}
