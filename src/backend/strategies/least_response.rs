//! Least-response-time selection.

use super::{Candidate, SelectionStrategy};
use crate::config::Strategy;

/// Picks the fastest measured candidate.
///
/// Measured candidates always beat unmeasured ones; with no measurements at
/// all the first candidate is used.
pub struct LeastResponseTime;

impl SelectionStrategy for LeastResponseTime {
    fn kind(&self) -> Strategy {
        Strategy::LeastResponseTime
    }

    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        candidates
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| c.health.last_response_time_ms.map(|rt| (idx, rt)))
            .min_by_key(|&(idx, rt)| (rt, idx))
            .map(|(idx, _)| idx)
            .or(Some(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::strategies::candidate;

    #[test]
    fn test_picks_fastest() {
        let candidates = vec![
            candidate(1, Some(300), 0, 0),
            candidate(2, Some(80), 0, 0),
            candidate(3, Some(120), 0, 0),
        ];
        assert_eq!(LeastResponseTime.select(&candidates), Some(1));
    }

    #[test]
    fn test_measured_beats_unmeasured() {
        let candidates = vec![candidate(1, None, 0, 0), candidate(2, Some(4000), 0, 0)];
        assert_eq!(LeastResponseTime.select(&candidates), Some(1));
    }

    #[test]
    fn test_no_measurements_picks_first() {
        let candidates = vec![candidate(1, None, 0, 0), candidate(2, None, 0, 0)];
        assert_eq!(LeastResponseTime.select(&candidates), Some(0));
    }

    #[test]
    fn test_tie_prefers_registry_order() {
        let candidates = vec![candidate(1, Some(90), 0, 0), candidate(2, Some(90), 0, 0)];
        assert_eq!(LeastResponseTime.select(&candidates), Some(0));
    }
}
