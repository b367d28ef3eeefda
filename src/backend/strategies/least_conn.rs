//! Least-connections selection.

use super::{Candidate, SelectionStrategy};
use crate::config::Strategy;

/// Picks the candidate with the fewest in-flight requests; first wins ties.
pub struct LeastConnections;

impl SelectionStrategy for LeastConnections {
    fn kind(&self) -> Strategy {
        Strategy::LeastConnections
    }

    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        let mut min_conns = u32::MAX;
        let mut selected = None;

        for (idx, candidate) in candidates.iter().enumerate() {
            if candidate.connections < min_conns {
                min_conns = candidate.connections;
                selected = Some(idx);
            }
        }

        selected
    }
}
