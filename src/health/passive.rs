//! Passive health tracking.
//!
//! Feeds application request outcomes back into the shared health state.

use crate::backend::BackendId;
use crate::health::HealthState;
use crate::metrics::MetricsCollector;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a request attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The attempt hit its deadline.
    Timeout,
    /// Connection refused, reset, DNS failure and the like.
    Network,
    /// The backend answered with a non-2xx status.
    ServerStatus(u16),
}

impl FailureClass {
    /// Whether this failure takes the backend out of rotation.
    ///
    /// Status errors do not: a backend can be up and still answer 4xx/5xx
    /// for reasons unrelated to its health.
    pub fn evicts(&self) -> bool {
        matches!(self, FailureClass::Timeout | FailureClass::Network)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Timeout => f.write_str("timeout"),
            FailureClass::Network => f.write_str("network"),
            FailureClass::ServerStatus(status) => write!(f, "HTTP {}", status),
        }
    }
}

/// Records request outcomes against backend health.
#[derive(Clone)]
pub struct PassiveHealthTracker {
    health_state: Arc<HealthState>,
    metrics: MetricsCollector,
}

impl PassiveHealthTracker {
    pub fn new(health_state: Arc<HealthState>, metrics: MetricsCollector) -> Self {
        Self {
            health_state,
            metrics,
        }
    }

    /// A request succeeded: the backend is healthy and its latency is fresh.
    pub fn record_success(&self, id: BackendId, response_time: Duration) {
        self.health_state.record_success(id, Some(response_time), None);
        self.metrics.set_backend_health(id, true);
    }

    /// A request failed.
    pub fn record_failure(&self, id: BackendId, class: FailureClass, detail: &str) {
        if class.evicts() {
            self.health_state.record_failure(id, detail);
            self.metrics
                .set_backend_health(id, self.health_state.is_eligible(id));
        } else {
            self.health_state.record_soft_failure(id, detail);
        }
    }

    pub fn is_eligible(&self, id: BackendId) -> bool {
        self.health_state.is_eligible(id)
    }
}
