//! The request executor.
//!
//! Application code calls [`RequestExecutor::execute`] instead of talking to
//! a fixed endpoint. Each call selects a backend, bounds the attempt with a
//! timeout, and on failure backs off and moves on to a backend it has not
//! tried yet.

use super::retry::RetryPolicy;
use crate::backend::{Backend, BackendId, LoadBalancer};
use crate::health::{FailureClass, HealthState, PassiveHealthTracker};
use crate::keepalive::KeepAliveScheduler;
use crate::metrics::{MetricsCollector, RequestOutcome};
use crate::stats::RequestStats;
use crate::transport::{Method, OutboundRequest, Transport, TransportError, TransportResponse};
use crate::util::{RequestId, REQUEST_ID_HEADER};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Errors surfaced by [`RequestExecutor::execute`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("request path must not be empty")]
    InvalidPath,

    #[error("no backends registered")]
    NoBackends,

    #[error("request failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Per-call request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Correlates every attempt of this call in logs and on the wire.
    pub request_id: Option<RequestId>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            request_id: None,
        }
    }
}

impl RequestOptions {
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Executes outbound requests with backend selection and retry.
pub struct RequestExecutor {
    balancer: Arc<LoadBalancer>,
    health: Arc<HealthState>,
    passive: PassiveHealthTracker,
    transport: Arc<dyn Transport>,
    keep_alive: Option<Arc<KeepAliveScheduler>>,
    stats: Arc<RequestStats>,
    metrics: MetricsCollector,
    policy: RetryPolicy,
}

impl RequestExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        balancer: Arc<LoadBalancer>,
        health: Arc<HealthState>,
        transport: Arc<dyn Transport>,
        keep_alive: Option<Arc<KeepAliveScheduler>>,
        stats: Arc<RequestStats>,
        metrics: MetricsCollector,
        policy: RetryPolicy,
    ) -> Self {
        let passive = PassiveHealthTracker::new(Arc::clone(&health), metrics.clone());
        Self {
            balancer,
            health,
            passive,
            transport,
            keep_alive,
            stats,
            metrics,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `path` to a backend, retrying on up to `max_retries` attempts.
    pub async fn execute(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<TransportResponse, ExecuteError> {
        let path = normalize_path(path)?;
        let request_id = options.request_id.clone().unwrap_or_default();
        let span = info_span!("execute", request_id = %request_id, method = %options.method, path = %path);

        self.execute_inner(&path, &options, &request_id)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        path: &str,
        options: &RequestOptions,
        request_id: &RequestId,
    ) -> Result<TransportResponse, ExecuteError> {
        let max_attempts = self.policy.max_retries;
        let mut attempted: Vec<BackendId> = Vec::new();
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            let backend = self
                .next_backend(&attempted)
                .await
                .ok_or(ExecuteError::NoBackends)?;
            if !attempted.contains(&backend.id) {
                attempted.push(backend.id);
            }

            match self.attempt(&backend, path, options, request_id).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!(attempt = attempt + 1, backend_id = backend.id, "request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err((class, detail)) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        backend_id = backend.id,
                        url = %backend.base_url,
                        failure = %class,
                        error = %detail,
                        "request attempt failed"
                    );
                    last_error = detail;
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.policy.backoff(attempt);
                debug!(delay = ?delay, "backing off before next attempt");
                tokio::time::sleep(delay).await;
            }
        }

        error!(attempts = max_attempts, error = %last_error, "request exhausted all attempts");
        Err(ExecuteError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Pick the backend for the next attempt.
    ///
    /// Prefers an eligible backend not yet attempted. When none is left, tries
    /// to wake an unhealthy one, and finally degrades to the balancer's
    /// last-resort pick.
    async fn next_backend(&self, attempted: &[BackendId]) -> Option<Backend> {
        if let Some(backend) = self.balancer.select_excluding(attempted) {
            return Some(backend);
        }

        if let Some(keep_alive) = &self.keep_alive {
            let sleeping = self
                .health
                .ineligible()
                .into_iter()
                .find(|id| !attempted.contains(id));

            if let Some(id) = sleeping {
                info!(backend_id = id, "no eligible backend left, attempting wake-up");
                if keep_alive.wake_up_backend(id).await {
                    if let Some(backend) = self.balancer.select_excluding(attempted) {
                        return Some(backend);
                    }
                }
            }
        }

        self.balancer.select_backend()
    }

    async fn attempt(
        &self,
        backend: &Backend,
        path: &str,
        options: &RequestOptions,
        request_id: &RequestId,
    ) -> Result<TransportResponse, (FailureClass, String)> {
        let mut headers = options.headers.clone();
        headers.push((REQUEST_ID_HEADER.to_string(), request_id.to_string()));

        let request = OutboundRequest {
            method: options.method.clone(),
            url: backend.url_for(path),
            headers,
            body: options.body.clone(),
            timeout: self.policy.timeout,
        };

        self.stats.record_request();
        self.metrics.request_started(backend.id);
        let started = Instant::now();

        let result = match tokio::time::timeout(self.policy.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.policy.timeout)),
        };
        let elapsed = started.elapsed();

        self.metrics.request_finished(backend.id);
        self.balancer.release(backend.id);

        let failure = match result {
            Ok(response) if response.is_success() => {
                self.stats.record_success();
                self.metrics
                    .record_request(backend.id, RequestOutcome::Success, elapsed);
                self.passive.record_success(backend.id, elapsed);
                return Ok(response);
            }
            Ok(response) => (
                FailureClass::ServerStatus(response.status),
                format!("HTTP {}", response.status),
            ),
            Err(e @ TransportError::Timeout(_)) => (FailureClass::Timeout, e.to_string()),
            Err(e) => (FailureClass::Network, e.to_string()),
        };

        let outcome = match failure.0 {
            FailureClass::Timeout => RequestOutcome::Timeout,
            FailureClass::Network => RequestOutcome::NetworkError,
            FailureClass::ServerStatus(_) => RequestOutcome::ServerError,
        };
        self.stats.record_failure();
        self.metrics.record_request(backend.id, outcome, elapsed);
        self.passive.record_failure(backend.id, failure.0, &failure.1);
        Err(failure)
    }
}

/// Reject empty paths and make sure the rest start with `/`.
fn normalize_path(path: &str) -> Result<String, ExecuteError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(ExecuteError::InvalidPath);
    }
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("/{}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use crate::config::{BackendConfig, ResourceLevel, Strategy};
    use crate::health::{HealthProber, ProbeConfig};
    use crate::keepalive::KeepAliveSettings;
    use crate::transport::mock::{json_response, ScriptedTransport};
    use crate::transport::TransportResponse;
    use std::time::Duration;

    struct Fixture {
        executor: RequestExecutor,
        transport: Arc<ScriptedTransport>,
        health: Arc<HealthState>,
        stats: Arc<RequestStats>,
    }

    fn fixture<F>(n: usize, with_keep_alive: bool, responder: F) -> Fixture
    where
        F: Fn(&OutboundRequest) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    {
        let configs: Vec<BackendConfig> = (1..=n)
            .map(|i| BackendConfig {
                url: format!("http://node{}.test", i),
                label: format!("node-{}", i),
            })
            .collect();
        let registry = Arc::new(BackendRegistry::from_config(&configs).unwrap());
        let health = Arc::new(HealthState::new());
        for b in registry.snapshot().iter() {
            health.register(b.id);
        }
        let stats = Arc::new(RequestStats::new());
        let metrics = MetricsCollector::new();
        let transport = Arc::new(ScriptedTransport::new(responder));
        let balancer = Arc::new(LoadBalancer::new(
            Arc::clone(&registry),
            Arc::clone(&health),
            Arc::clone(&stats),
            metrics.clone(),
            Strategy::LeastConnections,
        ));

        let keep_alive = with_keep_alive.then(|| {
            let prober = Arc::new(HealthProber::new(
                Arc::clone(&registry),
                Arc::clone(&health),
                transport.clone(),
                metrics.clone(),
                ProbeConfig::default(),
            ));
            Arc::new(KeepAliveScheduler::new(
                Arc::clone(&registry),
                prober,
                metrics.clone(),
                KeepAliveSettings::for_level(ResourceLevel::Normal, 3),
            ))
        });

        let executor = RequestExecutor::new(
            balancer,
            Arc::clone(&health),
            transport.clone(),
            keep_alive,
            Arc::clone(&stats),
            metrics,
            RetryPolicy::default(),
        );
        Fixture {
            executor,
            transport,
            health,
            stats,
        }
    }

    fn host(url: &str) -> &str {
        url.split('/').nth(2).unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_target_makes_exactly_max_retries_calls() {
        for n in [1, 2, 3, 5] {
            let f = fixture(n, false, |_| Err(TransportError::Network("connection refused".into())));

            let result = f.executor.execute("/api/messages", RequestOptions::default()).await;

            assert_eq!(
                result,
                Err(ExecuteError::Exhausted {
                    attempts: 3,
                    last_error: "network error: connection refused".to_string(),
                })
            );
            assert_eq!(f.transport.call_count(), 3, "with {} backends", n);
            assert_eq!(f.stats.snapshot().failed_requests, 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_move_to_unattempted_backends() {
        let f = fixture(3, false, |req| {
            if req.url.contains("node3") {
                Ok(json_response(200, r#"{"ok":true}"#))
            } else {
                Err(TransportError::Timeout(Duration::from_secs(8)))
            }
        });

        let response = f.executor.execute("rooms", RequestOptions::default()).await.unwrap();
        assert_eq!(response.status, 200);

        let hosts: Vec<String> = f.transport.calls().iter().map(|u| host(u).to_string()).collect();
        assert_eq!(hosts, vec!["node1.test", "node2.test", "node3.test"]);
        assert_eq!(f.transport.calls()[0], "http://node1.test/rooms");

        assert!(!f.health.record(1).is_healthy);
        assert!(!f.health.record(2).is_healthy);
        assert!(f.health.record(3).is_healthy);
        assert!(f.health.record(3).last_response_time_ms.is_some());

        let stats = f.stats.snapshot();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_do_not_evict() {
        let f = fixture(2, false, |_| Ok(json_response(503, "busy")));

        let result = f.executor.execute("/api", RequestOptions::default()).await;
        assert!(matches!(result, Err(ExecuteError::Exhausted { attempts: 3, .. })));

        for id in [1, 2] {
            let record = f.health.record(id);
            assert!(record.is_healthy);
            assert_eq!(record.consecutive_failures, 0);
        }
        assert_eq!(f.health.record(1).last_error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts_only() {
        let f = fixture(1, false, |_| Ok(json_response(500, "")));
        let started = tokio::time::Instant::now();

        let _ = f.executor.execute("/x", RequestOptions::default()).await;

        // 1s after the first failure, 2s after the second, none after the last
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out_and_is_evicted() {
        struct Stalled;

        #[async_trait::async_trait]
        impl Transport for Stalled {
            async fn send(&self, _: OutboundRequest) -> Result<TransportResponse, TransportError> {
                std::future::pending().await
            }
        }

        let f = fixture(2, false, |_| Ok(json_response(200, "")));
        let executor = RequestExecutor::new(
            Arc::clone(&f.executor.balancer),
            Arc::clone(&f.health),
            Arc::new(Stalled),
            None,
            Arc::clone(&f.stats),
            MetricsCollector::new(),
            RetryPolicy::default(),
        );

        let result = executor.execute("/slow", RequestOptions::default()).await;
        match result {
            Err(ExecuteError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!f.health.record(1).is_healthy);
        assert!(!f.health.record(2).is_healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wakes_unhealthy_backend_when_none_eligible() {
        let f = fixture(2, true, |req| {
            if req.url.ends_with("/health-check-primary") {
                Ok(json_response(200, r#"{"status":"healthy","uptime":3}"#))
            } else if req.url.contains("node1") {
                Err(TransportError::Network("connection reset".into()))
            } else {
                Ok(json_response(200, r#"{"done":true}"#))
            }
        });
        for _ in 0..3 {
            f.health.record_failure(2, "timeout");
        }

        let response = f.executor.execute("/work", RequestOptions::default()).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(f.health.is_eligible(2));
        assert!(f
            .transport
            .calls()
            .contains(&"http://node2.test/health-check-primary".to_string()));
    }

    #[tokio::test]
    async fn test_empty_path_rejected_without_calls() {
        let f = fixture(1, false, |_| Ok(json_response(200, "")));
        assert_eq!(
            f.executor.execute("  ", RequestOptions::default()).await.unwrap_err(),
            ExecuteError::InvalidPath
        );
        assert_eq!(f.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_request_id_and_body_forwarded() {
        let f = fixture(1, false, |req| {
            let has_id = req
                .headers
                .iter()
                .any(|(k, v)| k == "x-request-id" && v == "chat-42");
            let status = if has_id && req.body.is_some() && req.method == Method::POST {
                201
            } else {
                400
            };
            Ok(json_response(status, "{}"))
        });

        let options = RequestOptions::default()
            .with_method(Method::POST)
            .with_body(r#"{"message":"hola"}"#)
            .with_request_id(RequestId::from_string("chat-42"));
        let response = f.executor.execute("/api/messages", options).await.unwrap();
        assert_eq!(response.status, 201);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("api").unwrap(), "/api");
        assert_eq!(normalize_path("/api").unwrap(), "/api");
        assert_eq!(normalize_path(""), Err(ExecuteError::InvalidPath));
    }
}
