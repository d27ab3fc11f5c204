/// Property tests for queue sampling and routing policies.
use pqsim_core::job::{JobId, ReplicaKey};
use pqsim_core::queue::ServerQueue;
use pqsim_core::random::{Distribution, RandomStreams};
use pqsim_core::sampler::QueueSampler;
use pqsim_routing::*;
use proptest::prelude::*;
use std::collections::HashSet;

fn streams(seed: u64) -> RandomStreams {
    RandomStreams::from_distributions(
        seed,
        &Distribution::Exponential { rate: 1.0 },
        &Distribution::Exponential { rate: 1.0 },
    )
    .unwrap()
}

/// Queues holding the given numbers of jobs.
fn queues_with(occupancy: &[usize]) -> Vec<ServerQueue> {
    let mut job = 0;
    occupancy
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let mut q = ServerQueue::new(i);
            for _ in 0..count {
                job += 1;
                q.request(ReplicaKey::new(JobId(job), i));
            }
            q
        })
        .collect()
}

fn system() -> impl Strategy<Value = (Vec<usize>, usize)> {
    prop::collection::vec(0usize..6, 1..40)
        .prop_flat_map(|occupancy| {
            let n = occupancy.len();
            (Just(occupancy), 1..=n)
        })
}

proptest! {
    #[test]
    fn sample_has_d_distinct_in_range_indices((occupancy, d) in system(), seed in any::<u64>()) {
        let n = occupancy.len();
        let sampler = QueueSampler::new(n, d).unwrap();
        let picked = sampler.indices(&mut streams(seed));

        prop_assert_eq!(picked.len(), d);
        prop_assert!(picked.iter().all(|&i| i < n));
        let distinct: HashSet<_> = picked.iter().collect();
        prop_assert_eq!(distinct.len(), d);
    }

    #[test]
    fn sample_reports_jobs_in_system((occupancy, d) in system(), seed in any::<u64>()) {
        let queues = queues_with(&occupancy);
        let sampler = QueueSampler::new(occupancy.len(), d).unwrap();
        let sample = sampler.sample(&queues, &mut streams(seed));
        for q in sample.queues() {
            prop_assert_eq!(q.in_system, occupancy[q.index]);
        }
    }

    #[test]
    fn decisions_stay_within_sample(
        (occupancy, d) in system(),
        r in 0usize..6,
        seed in any::<u64>(),
    ) {
        let queues = queues_with(&occupancy);
        let sampler = QueueSampler::new(occupancy.len(), d).unwrap();
        let mut s = streams(seed);
        let sample = sampler.sample(&queues, &mut s);

        for name in available_policies() {
            let policy = policy_by_name(name, Some(r), TieBreak::Random).unwrap();
            let decision = policy.route(&sample, &mut s);
            prop_assert!(!decision.is_empty());
            prop_assert!(decision.len() <= d);
            prop_assert!(decision.targets().iter().all(|&i| sample.contains(i)));
            let distinct: HashSet<_> = decision.targets().iter().collect();
            prop_assert_eq!(distinct.len(), decision.len());
            if !policy.replicates() {
                prop_assert_eq!(decision.len(), 1);
            }
        }
    }

    #[test]
    fn shortest_queue_picks_a_minimum((occupancy, d) in system(), seed in any::<u64>()) {
        let queues = queues_with(&occupancy);
        let sampler = QueueSampler::new(occupancy.len(), d).unwrap();
        let mut s = streams(seed);
        let sample = sampler.sample(&queues, &mut s);
        let min = sample.min_in_system().unwrap();

        for tie_break in [TieBreak::Random, TieBreak::LowestIndex] {
            let decision = ShortestQueue::with_tie_break(tie_break).route(&sample, &mut s);
            prop_assert_eq!(occupancy[decision.targets()[0]], min);
        }
    }

    #[test]
    fn threshold_keeps_exactly_eligible_queues(
        (occupancy, d) in system(),
        r in 0usize..6,
        seed in any::<u64>(),
    ) {
        let queues = queues_with(&occupancy);
        let sampler = QueueSampler::new(occupancy.len(), d).unwrap();
        let mut s = streams(seed);
        let sample = sampler.sample(&queues, &mut s);
        let decision = ThresholdDR::new(r).route(&sample, &mut s);

        let eligible: Vec<usize> = sample
            .queues()
            .iter()
            .filter(|q| q.in_system <= r)
            .map(|q| q.index)
            .collect();
        if eligible.is_empty() {
            prop_assert_eq!(decision.len(), 1);
            prop_assert!(occupancy[decision.targets()[0]] > r);
        } else {
            prop_assert_eq!(decision.targets(), eligible.as_slice());
        }
    }

    #[test]
    fn redundancy_copies_whole_sample((occupancy, d) in system(), seed in any::<u64>()) {
        let queues = queues_with(&occupancy);
        let sampler = QueueSampler::new(occupancy.len(), d).unwrap();
        let mut s = streams(seed);
        let sample = sampler.sample(&queues, &mut s);
        let decision = RedundancyD::new().route(&sample, &mut s);
        let expected: Vec<usize> = sample.indices().collect();
        prop_assert_eq!(decision.targets(), expected.as_slice());
    }
}

#[test]
fn full_sample_takes_no_draw() {
    let queues = queues_with(&[2, 0, 1]);
    let sampler = QueueSampler::new(3, 3).unwrap();
    let mut s = streams(1);
    let sample = sampler.sample(&queues, &mut s);
    let decision = ShortestQueue::new().route(&sample, &mut s);
    assert_eq!(decision, RoutingDecision::Route(1));
    // Unique minimum and full sample: the stream is untouched.
    assert_eq!(s.draws(), 0);
}

#[test]
fn sampling_is_uniform_enough() {
    let sampler = QueueSampler::new(10, 2).unwrap();
    let mut s = streams(2024);
    let mut hits = [0u32; 10];
    for _ in 0..20_000 {
        for i in sampler.indices(&mut s) {
            hits[i] += 1;
        }
    }
    // 4000 expected per queue.
    assert!(hits.iter().all(|&h| (3600..=4400).contains(&h)), "{:?}", hits);
}
