//! Round-robin selection.

use super::{Candidate, SelectionStrategy};
use crate::config::Strategy;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cycles through the eligible list, advancing on every call.
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for RoundRobin {
    fn kind(&self) -> Strategy {
        Strategy::RoundRobin
    }

    fn select(&self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        Some(self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len())
    }
}
