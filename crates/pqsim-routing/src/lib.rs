//! Built-in routing policies for pqsim.
//!
//! This crate provides the [`RoutingPolicy`] trait and the policies studied
//! on parallel single-server queues:
//!
//! | Policy | Strategy | Replicas per job |
//! |--------|----------|------------------|
//! | [`ShortestQueue`] | Fewest jobs among d sampled queues | 1 |
//! | [`RedundancyD`] | Copy to every sampled queue | d |
//! | [`ThresholdDR`] | Copy to sampled queues with at most r jobs | 1..=d |

pub mod redundancy;
pub mod shortest_queue;
pub mod threshold;
pub mod traits;

pub use redundancy::RedundancyD;
pub use shortest_queue::ShortestQueue;
pub use threshold::ThresholdDR;
pub use traits::*;

/// Create a routing policy by name.
///
/// `threshold` requires `r`; the other policies ignore it.
pub fn policy_by_name(
    name: &str,
    r: Option<usize>,
    tie_break: TieBreak,
) -> Option<Box<dyn RoutingPolicy>> {
    match name {
        "shortest_queue" | "jsq" => Some(Box::new(ShortestQueue::with_tie_break(tie_break))),
        "redundancy" => Some(Box::new(RedundancyD::new())),
        "threshold" => r.map(|r| Box::new(ThresholdDR::new(r)) as Box<dyn RoutingPolicy>),
        _ => None,
    }
}

/// List all built-in policy names.
pub fn available_policies() -> Vec<&'static str> {
    vec!["shortest_queue", "redundancy", "threshold"]
}
