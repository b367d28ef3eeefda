//! Active liveness prober.
//!
//! Periodically probes backends. Each probe tries the primary liveness
//! endpoint and falls back to the simpler one before declaring failure, since
//! independently deployed backends may not all expose the newer endpoint.

use crate::backend::{Backend, BackendId, BackendRegistry};
use crate::config::HealthCheckConfig;
use crate::health::HealthState;
use crate::metrics::{MetricsCollector, ProbeEndpoint};
use crate::transport::{OutboundRequest, Transport};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Probe settings.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub primary_path: String,
    pub fallback_path: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig::from(&HealthCheckConfig::default())
    }
}

impl From<&HealthCheckConfig> for ProbeConfig {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            interval: config.interval,
            timeout: config.timeout,
            primary_path: config.primary_path.clone(),
            fallback_path: config.fallback_path.clone(),
        }
    }
}

/// Body of either liveness endpoint; extra fields are ignored.
#[derive(Debug, Deserialize)]
struct LivenessReport {
    status: String,
    #[serde(default)]
    uptime: Option<f64>,
}

/// A passing liveness check.
struct Alive {
    response_time: Duration,
    uptime: Option<f64>,
}

/// Probes backends and writes the results into [`HealthState`].
pub struct HealthProber {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthState>,
    transport: Arc<dyn Transport>,
    metrics: MetricsCollector,
    config: ProbeConfig,
}

impl HealthProber {
    pub fn new(
        registry: Arc<BackendRegistry>,
        health: Arc<HealthState>,
        transport: Arc<dyn Transport>,
        metrics: MetricsCollector,
        config: ProbeConfig,
    ) -> Self {
        Self {
            registry,
            health,
            transport,
            metrics,
            config,
        }
    }

    /// Probe every registered backend concurrently. Never fails.
    pub async fn probe_all(&self) {
        let backends = self.registry.snapshot();
        let results = join_all(backends.iter().map(|b| self.probe_backend(b))).await;

        let healthy = results.iter().filter(|ok| **ok).count();
        info!(total = backends.len(), healthy, "probed all backends");
    }

    /// Probe the given backends concurrently.
    pub async fn probe_ids(&self, ids: &[BackendId]) {
        let backends: Vec<Backend> = ids.iter().filter_map(|id| self.registry.get(*id)).collect();
        join_all(backends.iter().map(|b| self.probe_backend(b))).await;
    }

    /// Probe one backend and record the outcome. Returns whether it is alive.
    pub async fn probe_backend(&self, backend: &Backend) -> bool {
        let primary = self
            .check(backend, &self.config.primary_path, &["healthy", "degraded"])
            .await;
        self.metrics
            .record_health_check(backend.id, ProbeEndpoint::Primary, primary.is_ok());

        let outcome = match primary {
            Ok(alive) => Ok(alive),
            Err(primary_error) => {
                debug!(
                    backend_id = backend.id,
                    error = %primary_error,
                    "primary liveness check failed, trying fallback"
                );
                let fallback = self.check(backend, &self.config.fallback_path, &["alive"]).await;
                self.metrics
                    .record_health_check(backend.id, ProbeEndpoint::Fallback, fallback.is_ok());
                fallback.map_err(|fallback_error| {
                    format!("primary: {}; fallback: {}", primary_error, fallback_error)
                })
            }
        };

        let alive = match outcome {
            Ok(alive) => {
                debug!(
                    backend_id = backend.id,
                    response_ms = alive.response_time.as_millis() as u64,
                    "liveness check passed"
                );
                self.health
                    .record_success(backend.id, Some(alive.response_time), alive.uptime);
                true
            }
            Err(error) => {
                warn!(backend_id = backend.id, url = %backend.base_url, error = %error, "liveness check failed");
                self.health.record_failure(backend.id, &error);
                false
            }
        };

        self.metrics
            .set_backend_health(backend.id, self.health.is_eligible(backend.id));
        alive
    }

    /// Probe every backend on the configured interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(interval = ?self.config.interval, "health prober starting");

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    info!("health prober shutting down");
                    break;
                }
            }
        }
    }

    async fn check(&self, backend: &Backend, path: &str, accepted: &[&str]) -> Result<Alive, String> {
        let request = OutboundRequest::get(backend.url_for(path), self.config.timeout);
        let started = Instant::now();

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.to_string())?;
        let response_time = started.elapsed();

        if !response.is_success() {
            return Err(format!("HTTP {}", response.status));
        }

        let report: LivenessReport = response
            .json()
            .map_err(|e| format!("malformed liveness body: {}", e))?;

        if !accepted.contains(&report.status.as_str()) {
            return Err(format!("reported status '{}'", report.status));
        }
        if report.status == "degraded" {
            warn!(backend_id = backend.id, "backend reports degraded status");
        }

        Ok(Alive {
            response_time,
            uptime: report.uptime,
        })
    }
}
