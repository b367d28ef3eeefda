//! Metrics collector using prometheus-client.
//!
//! Provides metrics for outbound requests, backend health, keep-alive
//! rotation and translation failover.

use crate::backend::BackendId;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Labels for per-backend metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    pub backend: String,
}

/// Labels for request outcome metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub backend: String,
    pub outcome: RequestOutcome,
}

/// How a single request attempt ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RequestOutcome {
    Success,
    ServerError,
    Timeout,
    NetworkError,
}

/// Labels for health check metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HealthCheckLabels {
    pub backend: String,
    pub endpoint: ProbeEndpoint,
    pub result: CheckResult,
}

/// Which liveness endpoint answered.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ProbeEndpoint {
    Primary,
    Fallback,
}

/// Result of a check or attempt.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum CheckResult {
    Success,
    Failure,
}

/// Labels for translation provider metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TranslationLabels {
    pub account: String,
    pub result: CheckResult,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Request attempts by backend and outcome.
    requests_total: Family<RequestLabels, Counter>,
    /// Attempt duration histogram (in seconds).
    request_duration_seconds: Family<BackendLabels, Histogram>,
    /// In-flight requests per backend.
    inflight_requests: Family<BackendLabels, Gauge>,
    /// Backend health gauge (1 = eligible, 0 = not).
    backend_health: Family<BackendLabels, Gauge>,
    /// Liveness probe results.
    health_checks_total: Family<HealthCheckLabels, Counter>,
    /// Selections that changed backend.
    backend_switches_total: Counter,
    /// Current keep-alive active set size.
    active_set_size: Gauge,
    /// Translation provider calls.
    translation_attempts_total: Family<TranslationLabels, Counter>,
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds =
            Family::<BackendLabels, Histogram>::new_with_constructor(|| {
                // 10ms .. ~20s
                Histogram::new(exponential_buckets(0.01, 2.0, 12))
            });
        let inflight_requests = Family::<BackendLabels, Gauge>::default();
        let backend_health = Family::<BackendLabels, Gauge>::default();
        let health_checks_total = Family::<HealthCheckLabels, Counter>::default();
        let backend_switches_total = Counter::default();
        let active_set_size = Gauge::default();
        let translation_attempts_total = Family::<TranslationLabels, Counter>::default();

        registry.register(
            "lingualink_requests",
            "Outbound request attempts by backend and outcome",
            requests_total.clone(),
        );
        registry.register(
            "lingualink_request_duration_seconds",
            "Outbound request attempt duration in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "lingualink_inflight_requests",
            "Requests currently in flight per backend",
            inflight_requests.clone(),
        );
        registry.register(
            "lingualink_backend_health",
            "Backend eligibility (1=eligible, 0=not)",
            backend_health.clone(),
        );
        registry.register(
            "lingualink_health_checks",
            "Liveness probes by backend, endpoint and result",
            health_checks_total.clone(),
        );
        registry.register(
            "lingualink_backend_switches",
            "Selections that picked a different backend than the previous one",
            backend_switches_total.clone(),
        );
        registry.register(
            "lingualink_active_set_size",
            "Backends currently kept warm by the keep-alive scheduler",
            active_set_size.clone(),
        );
        registry.register(
            "lingualink_translation_attempts",
            "Translation provider calls by account and result",
            translation_attempts_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                inflight_requests,
                backend_health,
                health_checks_total,
                backend_switches_total,
                active_set_size,
                translation_attempts_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a finished request attempt.
    pub fn record_request(&self, backend: BackendId, outcome: RequestOutcome, duration: Duration) {
        let labels = RequestLabels {
            backend: backend.to_string(),
            outcome,
        };
        self.inner.requests_total.get_or_create(&labels).inc();
        self.inner
            .request_duration_seconds
            .get_or_create(&backend_labels(backend))
            .observe(duration.as_secs_f64());
    }

    pub fn request_started(&self, backend: BackendId) {
        self.inner
            .inflight_requests
            .get_or_create(&backend_labels(backend))
            .inc();
    }

    pub fn request_finished(&self, backend: BackendId) {
        self.inner
            .inflight_requests
            .get_or_create(&backend_labels(backend))
            .dec();
    }

    /// Update backend eligibility.
    pub fn set_backend_health(&self, backend: BackendId, eligible: bool) {
        self.inner
            .backend_health
            .get_or_create(&backend_labels(backend))
            .set(if eligible { 1 } else { 0 });
    }

    /// Record a liveness probe result.
    pub fn record_health_check(&self, backend: BackendId, endpoint: ProbeEndpoint, success: bool) {
        let labels = HealthCheckLabels {
            backend: backend.to_string(),
            endpoint,
            result: result_of(success),
        };
        self.inner.health_checks_total.get_or_create(&labels).inc();
    }

    pub fn record_backend_switch(&self) {
        self.inner.backend_switches_total.inc();
    }

    pub fn set_active_set_size(&self, size: usize) {
        self.inner.active_set_size.set(size as i64);
    }

    /// Record one translation provider call.
    pub fn record_translation_attempt(&self, account: &str, success: bool) {
        let labels = TranslationLabels {
            account: account.to_string(),
            result: result_of(success),
        };
        self.inner.translation_attempts_total.get_or_create(&labels).inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn backend_labels(backend: BackendId) -> BackendLabels {
    BackendLabels {
        backend: backend.to_string(),
    }
}

fn result_of(success: bool) -> CheckResult {
    if success {
        CheckResult::Success
    } else {
        CheckResult::Failure
    }
}
