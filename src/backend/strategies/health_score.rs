//! Composite health score selection.

use super::{Candidate, SelectionStrategy};
use crate::config::Strategy;

/// Picks the candidate with the highest [`health_score`]; first wins ties.
pub struct HealthBased;

/// Score out of roughly 120, floored at 0.
///
/// Starts at 100, loses up to 50 for latency (1 per 100ms), 20 per
/// consecutive failure and 5 per in-flight request, and gains up to 20 for
/// reported uptime (1 per hour).
pub fn health_score(candidate: &Candidate) -> f64 {
    let response_ms = candidate.response_time_or_default() as f64;
    let uptime_secs = candidate.health.reported_uptime_secs.unwrap_or(0.0).max(0.0);

    let score = 100.0 - (response_ms / 100.0).min(50.0)
        - 20.0 * candidate.health.consecutive_failures as f64
        - 5.0 * candidate.connections as f64
        + (uptime_secs / 3600.0).min(20.0);

    score.max(0.0)
}

impl SelectionStrategy for HealthBased {
    fn kind(&self) -> Strategy {
        Strategy::HealthBased
    }

    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            let score = health_score(candidate);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((idx, score)),
            }
        }
        best.map(|(idx, _)| idx)
    }
}
