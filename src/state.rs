//! Shared application state.
//!
//! Wires the registry, health state, balancer, prober, keep-alive scheduler,
//! executor and translation client together from one [`Config`].

use crate::backend::{Backend, BackendId, BackendRegistry, LoadBalancer, RegistryError};
use crate::config::{Config, Strategy};
use crate::executor::{RequestExecutor, RetryPolicy};
use crate::health::{HealthConfig, HealthProber, HealthRecord, HealthState, ProbeConfig};
use crate::keepalive::{KeepAliveScheduler, KeepAliveSettings, KeepAliveStatus};
use crate::metrics::MetricsCollector;
use crate::stats::{RequestStats, StatsSnapshot};
use crate::translation::{LogHistorySink, TranslationClient};
use crate::transport::{HttpTransport, Transport, TransportError};
use crate::util::ShutdownSignal;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Failure to assemble the application from a configuration.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("backend registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("http client: {0}")]
    Transport(#[from] TransportError),
}

/// One backend as reported by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    #[serde(flatten)]
    pub backend: Backend,
    pub eligible: bool,
    pub connections: u32,
    pub health: HealthRecord,
}

/// Snapshot served by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub strategy: Strategy,
    pub backends: Vec<BackendStatus>,
    pub keep_alive: KeepAliveStatus,
    pub stats: StatsSnapshot,
    pub translation_accounts: Vec<String>,
}

/// What a reload changed in the registry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: Vec<BackendId>,
    pub removed: Vec<BackendId>,
    pub relabeled: Vec<BackendId>,
}

/// Shared state accessible from all tasks.
#[derive(Clone)]
pub struct AppState {
    /// Current configuration (can be swapped atomically for hot reload).
    config: Arc<ArcSwap<Config>>,
    registry: Arc<BackendRegistry>,
    health: Arc<HealthState>,
    stats: Arc<RequestStats>,
    metrics: MetricsCollector,
    balancer: Arc<LoadBalancer>,
    prober: Arc<HealthProber>,
    keep_alive: Arc<KeepAliveScheduler>,
    executor: Arc<RequestExecutor>,
    translation: Option<Arc<TranslationClient>>,
    shutdown: ShutdownSignal,
}

impl AppState {
    /// Build the application with the reqwest transport.
    pub fn new(config: Config) -> Result<Self, StateError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// Build the application on top of any transport.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self, StateError> {
        let metrics = MetricsCollector::new();
        let registry = Arc::new(BackendRegistry::from_config(&config.backends)?);

        let health = Arc::new(HealthState::with_config(HealthConfig {
            max_consecutive_failures: config.health_check.max_consecutive_failures,
        }));
        for backend in registry.snapshot().iter() {
            health.register(backend.id);
            metrics.set_backend_health(backend.id, true);
        }

        let stats = Arc::new(RequestStats::new());
        let balancer = Arc::new(LoadBalancer::new(
            Arc::clone(&registry),
            Arc::clone(&health),
            Arc::clone(&stats),
            metrics.clone(),
            config.load_balancer.strategy,
        ));

        let prober = Arc::new(HealthProber::new(
            Arc::clone(&registry),
            Arc::clone(&health),
            Arc::clone(&transport),
            metrics.clone(),
            ProbeConfig::from(&config.health_check),
        ));

        let keep_alive = Arc::new(KeepAliveScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&prober),
            metrics.clone(),
            KeepAliveSettings::from(&config.keep_alive),
        ));

        let executor = Arc::new(RequestExecutor::new(
            Arc::clone(&balancer),
            Arc::clone(&health),
            Arc::clone(&transport),
            Some(Arc::clone(&keep_alive)),
            Arc::clone(&stats),
            metrics.clone(),
            RetryPolicy::from(&config.requests),
        ));

        let translation = config.translation.as_ref().map(|t| {
            Arc::new(
                TranslationClient::from_config(t, Arc::clone(&transport), metrics.clone())
                    .with_history(Arc::new(LogHistorySink)),
            )
        });

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            registry,
            health,
            stats,
            metrics,
            balancer,
            prober,
            keep_alive,
            executor,
            translation,
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Get the current configuration.
    pub fn config(&self) -> arc_swap::Guard<Arc<Config>> {
        self.config.load()
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    pub fn stats(&self) -> &Arc<RequestStats> {
        &self.stats
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn prober(&self) -> &Arc<HealthProber> {
        &self.prober
    }

    pub fn keep_alive(&self) -> &Arc<KeepAliveScheduler> {
        &self.keep_alive
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn translation(&self) -> Option<&Arc<TranslationClient>> {
        self.translation.as_ref()
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn trigger_shutdown(&self) {
        self.keep_alive.stop();
        self.shutdown.shutdown();
    }

    /// Register a new backend. It is selectable immediately.
    pub fn add_backend(&self, url: &str, label: &str) -> Backend {
        let backend = self.registry.add(url, label);
        self.health.register(backend.id);
        self.metrics.set_backend_health(backend.id, true);
        backend
    }

    /// Remove a backend and everything tracked for it. Unknown ids are a no-op.
    pub fn remove_backend(&self, id: BackendId) -> Option<Backend> {
        let backend = self.registry.remove(id)?;
        self.health.unregister(id);
        self.balancer.forget(id);
        self.keep_alive.forget(id);
        Some(backend)
    }

    /// Apply a validated configuration reload.
    ///
    /// Strategy and keep-alive level take effect immediately. Backends are
    /// reconciled by URL, adding before removing so the registry never
    /// empties; a known URL with a new label is relabeled in place.
    pub fn apply_reload(&self, config: Config) -> ReloadSummary {
        self.balancer.set_strategy_kind(config.load_balancer.strategy);
        if config.keep_alive.resource_level != self.keep_alive.settings().level {
            self.keep_alive
                .adjust_resource_usage(config.keep_alive.resource_level);
        }

        let wanted: HashSet<String> = config
            .backends
            .iter()
            .map(|b| normalize_url(&b.url))
            .collect();

        let mut summary = ReloadSummary::default();
        for backend in &config.backends {
            match self.registry.find_by_url(&backend.url) {
                None => summary.added.push(self.add_backend(&backend.url, &backend.label).id),
                Some(existing) if existing.label != backend.label => {
                    if self.registry.relabel(existing.id, &backend.label).is_some() {
                        summary.relabeled.push(existing.id);
                    }
                }
                Some(_) => {}
            }
        }
        for backend in self.registry.snapshot().iter() {
            if !wanted.contains(&normalize_url(&backend.base_url))
                && self.remove_backend(backend.id).is_some()
            {
                summary.removed.push(backend.id);
            }
        }

        self.config.store(Arc::new(config));
        info!(
            added = summary.added.len(),
            removed = summary.removed.len(),
            relabeled = summary.relabeled.len(),
            strategy = %self.balancer.strategy(),
            "configuration reloaded"
        );
        summary
    }

    pub fn status(&self) -> StatusReport {
        let backends = self
            .registry
            .snapshot()
            .iter()
            .map(|b| BackendStatus {
                backend: b.clone(),
                eligible: self.health.is_eligible(b.id),
                connections: self.balancer.connection_count(b.id),
                health: self.health.record(b.id),
            })
            .collect();

        StatusReport {
            strategy: self.balancer.strategy(),
            backends,
            keep_alive: self.keep_alive.status(),
            stats: self.stats.snapshot(),
            translation_accounts: self
                .translation
                .as_ref()
                .map(|t| t.credential_labels().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, ResourceLevel};
    use crate::transport::mock::{json_response, ScriptedTransport};

    const CONFIG: &str = r#"
backends:
  - url: "https://node1.lingualink.test"
    label: "node-1"
  - url: "https://node2.lingualink.test/"
    label: "node-2"
load_balancer:
  strategy: round_robin
"#;

    fn state() -> AppState {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(json_response(200, r#"{"status":"healthy","uptime":1}"#))
        }));
        AppState::with_transport(parse_config(CONFIG).unwrap(), transport).unwrap()
    }

    #[test]
    fn test_built_from_config() {
        let state = state();
        assert_eq!(state.registry().len(), 2);
        assert_eq!(state.balancer().strategy(), Strategy::RoundRobin);
        assert!(state.translation().is_none());
        assert_eq!(state.keep_alive().active_backends(), vec![1, 2]);
    }

    #[test]
    fn test_add_and_remove_backend() {
        let state = state();
        let added = state.add_backend("https://node3.lingualink.test", "node-3");
        assert_eq!(added.id, 3);
        assert!(state.health().is_eligible(3));

        state.balancer().select_excluding(&[1, 2]);
        assert_eq!(state.balancer().connection_count(3), 1);

        let removed = state.remove_backend(3).unwrap();
        assert_eq!(removed.label, "node-3");
        assert_eq!(state.balancer().connection_count(3), 0);
        assert!(state.remove_backend(3).is_none());
        assert_eq!(state.status().backends.len(), 2);
    }

    #[test]
    fn test_apply_reload_reconciles() {
        let state = state();
        let reloaded = parse_config(
            r#"
backends:
  - url: "https://node2.lingualink.test"
    label: "eu-west"
  - url: "https://node4.lingualink.test"
    label: "node-4"
load_balancer:
  strategy: least_connections
keep_alive:
  resource_level: high
"#,
        )
        .unwrap();

        let summary = state.apply_reload(reloaded);
        assert_eq!(
            summary,
            ReloadSummary {
                added: vec![3],
                removed: vec![1],
                relabeled: vec![2],
            }
        );
        assert_eq!(state.registry().get(2).unwrap().label, "eu-west");
        assert_eq!(state.balancer().strategy(), Strategy::LeastConnections);
        assert_eq!(state.keep_alive().settings().level, ResourceLevel::High);
        assert_eq!(state.config().backends.len(), 2);

        let ids: Vec<BackendId> = state.registry().snapshot().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_status_serializes() {
        let state = state();
        let value = serde_json::to_value(state.status()).unwrap();
        assert_eq!(value["strategy"], "round_robin");
        assert_eq!(value["backends"][1]["base_url"], "https://node2.lingualink.test");
        assert_eq!(value["backends"][0]["health"]["is_healthy"], true);
        assert_eq!(value["stats"]["total_requests"], 0);
    }
}
