//! Health state management.
//!
//! One [`HealthRecord`] per backend, written by the prober, the keep-alive
//! scheduler and the request executor. Records live in memory only.

use crate::backend::BackendId;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Shared health state for all backends.
#[derive(Debug)]
pub struct HealthState {
    records: DashMap<BackendId, HealthRecord>,
    config: HealthConfig,
}

/// Configuration for health tracking.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// A backend with this many consecutive failures is not selectable.
    pub max_consecutive_failures: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
        }
    }
}

/// Health information for a single backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub is_healthy: bool,
    /// Unix timestamp in milliseconds.
    pub last_checked_at: Option<u64>,
    pub last_response_time_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub reported_uptime_secs: Option<f64>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            is_healthy: true,
            last_checked_at: None,
            last_response_time_ms: None,
            consecutive_failures: 0,
            last_error: None,
            reported_uptime_secs: None,
        }
    }
}

impl HealthState {
    /// Create a new health state tracker with default config.
    pub fn new() -> Self {
        Self::with_config(HealthConfig::default())
    }

    /// Create a new health state tracker with custom config.
    pub fn with_config(config: HealthConfig) -> Self {
        Self {
            records: DashMap::new(),
            config,
        }
    }

    pub fn max_consecutive_failures(&self) -> u32 {
        self.config.max_consecutive_failures
    }

    /// Register a backend for health tracking. Backends start healthy.
    pub fn register(&self, id: BackendId) {
        self.records.entry(id).or_default();
    }

    /// Drop the record of a removed backend.
    pub fn unregister(&self, id: BackendId) {
        self.records.remove(&id);
    }

    /// Snapshot of a backend's record (default record if unknown).
    pub fn record(&self, id: BackendId) -> HealthRecord {
        self.records
            .get(&id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Whether the backend may be selected.
    pub fn is_eligible(&self, id: BackendId) -> bool {
        self.records
            .get(&id)
            .map(|r| r.is_healthy && r.consecutive_failures < self.config.max_consecutive_failures)
            .unwrap_or(true)
    }

    /// Record a successful probe or application request.
    pub fn record_success(
        &self,
        id: BackendId,
        response_time: Option<Duration>,
        uptime_secs: Option<f64>,
    ) {
        let mut entry = self.records.entry(id).or_default();
        let was_healthy = entry.is_healthy;

        entry.is_healthy = true;
        entry.consecutive_failures = 0;
        entry.last_error = None;
        entry.last_checked_at = Some(current_timestamp_ms());
        if let Some(rt) = response_time {
            entry.last_response_time_ms = Some(rt.as_millis() as u64);
        }
        if uptime_secs.is_some() {
            entry.reported_uptime_secs = uptime_secs;
        }

        if !was_healthy {
            tracing::info!(backend_id = id, "backend marked healthy");
        }
    }

    /// Record a failure that takes the backend out of rotation.
    pub fn record_failure(&self, id: BackendId, error: &str) {
        let mut entry = self.records.entry(id).or_default();
        let was_healthy = entry.is_healthy;

        entry.is_healthy = false;
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(error.to_string());
        entry.last_checked_at = Some(current_timestamp_ms());

        if was_healthy {
            tracing::warn!(
                backend_id = id,
                failures = entry.consecutive_failures,
                error,
                "backend marked unhealthy"
            );
        }
    }

    /// Note an error without touching eligibility.
    pub fn record_soft_failure(&self, id: BackendId, error: &str) {
        let mut entry = self.records.entry(id).or_default();
        entry.last_error = Some(error.to_string());
    }

    /// Ids of registered backends currently not eligible.
    pub fn ineligible(&self) -> Vec<BackendId> {
        let mut ids: Vec<BackendId> = self
            .records
            .iter()
            .filter(|r| {
                !r.is_healthy || r.consecutive_failures >= self.config.max_consecutive_failures
            })
            .map(|r| *r.key())
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_starts_healthy() {
        let state = HealthState::new();
        state.register(1);

        let record = state.record(1);
        assert!(record.is_healthy);
        assert_eq!(record.consecutive_failures, 0);
        assert!(record.last_checked_at.is_none());
        assert!(state.is_eligible(1));
    }

    #[test]
    fn test_failure_marks_ineligible() {
        let state = HealthState::new();
        state.register(1);

        state.record_failure(1, "connection refused");
        let record = state.record(1);
        assert!(!record.is_healthy);
        assert_eq!(record.consecutive_failures, 1);
        assert_eq!(record.last_error.as_deref(), Some("connection refused"));
        assert!(!state.is_eligible(1));
        assert_eq!(state.ineligible(), vec![1]);
    }

    #[test]
    fn test_failure_threshold_applies_even_when_healthy_flag_set() {
        let state = HealthState::with_config(HealthConfig {
            max_consecutive_failures: 2,
        });
        state.register(1);
        state.record_failure(1, "timeout");
        state.record_failure(1, "timeout");

        // A soft note does not clear the counter.
        state.record_soft_failure(1, "HTTP 500");
        {
            let mut entry = state.records.get_mut(&1).unwrap();
            entry.is_healthy = true;
        }
        assert!(!state.is_eligible(1));
    }

    #[test]
    fn test_success_resets_failures() {
        let state = HealthState::new();
        state.register(1);
        state.record_failure(1, "timeout");
        state.record_failure(1, "timeout");

        state.record_success(1, Some(Duration::from_millis(120)), Some(7200.0));
        let record = state.record(1);
        assert!(record.is_healthy);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.last_response_time_ms, Some(120));
        assert_eq!(record.reported_uptime_secs, Some(7200.0));
        assert!(record.last_error.is_none());
    }

    #[test]
    fn test_repeated_success_is_idempotent() {
        let state = HealthState::new();
        state.register(1);
        state.record_success(1, Some(Duration::from_millis(50)), None);
        state.record_success(1, Some(Duration::from_millis(50)), None);

        let record = state.record(1);
        assert!(record.is_healthy);
        assert_eq!(record.consecutive_failures, 0);
    }

    #[test]
    fn test_soft_failure_keeps_eligibility() {
        let state = HealthState::new();
        state.register(1);
        state.record_soft_failure(1, "HTTP 503");

        let record = state.record(1);
        assert!(record.is_healthy);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.last_error.as_deref(), Some("HTTP 503"));
        assert!(state.is_eligible(1));
    }

    #[test]
    fn test_unregister() {
        let state = HealthState::new();
        state.register(1);
        state.record_failure(1, "timeout");
        state.unregister(1);
        assert!(state.ineligible().is_empty());
    }
}
