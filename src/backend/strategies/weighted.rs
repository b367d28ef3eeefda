//! Weighted random selection driven by response time.

use super::{Candidate, SelectionStrategy};
use crate::config::Strategy;
use rand::Rng;

/// Draws a candidate with probability proportional to `1000 / response_ms`.
pub struct WeightedRoundRobin;

/// Integer weight of a candidate: `max(1, round(1000 / response_ms))`.
pub fn weight_for(candidate: &Candidate) -> u64 {
    let response_ms = candidate.response_time_or_default().max(1) as f64;
    ((1000.0 / response_ms).round() as u64).max(1)
}

/// Map a draw in `0..sum(weights)` onto an index.
fn pick(weights: &[u64], mut draw: u64) -> usize {
    for (idx, &weight) in weights.iter().enumerate() {
        if draw < weight {
            return idx;
        }
        draw -= weight;
    }
    weights.len() - 1
}

impl SelectionStrategy for WeightedRoundRobin {
    fn kind(&self) -> Strategy {
        Strategy::WeightedRoundRobin
    }

    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        let weights: Vec<u64> = candidates.iter().map(weight_for).collect();
        let total: u64 = weights.iter().sum();
        let draw = rand::thread_rng().gen_range(0..total);
        Some(pick(&weights, draw))
    }
}
