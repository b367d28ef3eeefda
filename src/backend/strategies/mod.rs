//! Backend selection strategies.
//!
//! Every strategy sees the same eligible candidate list, in registry order,
//! with a snapshot of each candidate's health record and in-flight count.

mod health_score;
mod least_conn;
mod least_response;
mod round_robin;
mod weighted;

pub use health_score::{health_score, HealthBased};
pub use least_conn::LeastConnections;
pub use least_response::LeastResponseTime;
pub use round_robin::RoundRobin;
pub use weighted::{weight_for, WeightedRoundRobin};

use crate::backend::Backend;
use crate::config::Strategy;
use crate::health::HealthRecord;

/// Response time assumed for a backend that has never been measured.
pub const UNMEASURED_RESPONSE_TIME_MS: u64 = 1000;

/// One eligible backend with the state strategies score it on.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub backend: Backend,
    pub health: HealthRecord,
    pub connections: u32,
}

impl Candidate {
    pub(crate) fn response_time_or_default(&self) -> u64 {
        self.health
            .last_response_time_ms
            .unwrap_or(UNMEASURED_RESPONSE_TIME_MS)
    }
}

/// Trait for backend selection strategies.
pub trait SelectionStrategy: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> Strategy;

    /// Pick one candidate, returning its index.
    ///
    /// Called with at least two candidates; `None` only for an empty slice.
    fn select(&self, candidates: &[Candidate]) -> Option<usize>;
}

/// Instantiate a strategy with fresh internal state.
pub fn build(strategy: Strategy) -> Box<dyn SelectionStrategy> {
    match strategy {
        Strategy::RoundRobin => Box::new(RoundRobin::new()),
        Strategy::LeastResponseTime => Box::new(LeastResponseTime),
        Strategy::LeastConnections => Box::new(LeastConnections),
        Strategy::WeightedRoundRobin => Box::new(WeightedRoundRobin),
        Strategy::HealthBased => Box::new(HealthBased),
    }
}

#[cfg(test)]
pub(crate) fn candidate(id: u64, response_ms: Option<u64>, failures: u32, connections: u32) -> Candidate {
    Candidate {
        backend: Backend {
            id,
            base_url: format!("https://node{}.lingualink.test", id),
            label: format!("node-{}", id),
        },
        health: HealthRecord {
            last_response_time_ms: response_ms,
            consecutive_failures: failures,
            ..HealthRecord::default()
        },
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_reports_kind() {
        for strategy in Strategy::ALL {
            assert_eq!(build(strategy).kind(), strategy);
        }
    }

    #[test]
    fn test_every_strategy_handles_empty() {
        for strategy in Strategy::ALL {
            assert!(build(strategy).select(&[]).is_none());
        }
    }
}
