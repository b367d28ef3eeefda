//! Load balancer selecting one backend per outgoing request.

use crate::backend::strategies::{self, Candidate, SelectionStrategy};
use crate::backend::{Backend, BackendId, BackendRegistry};
use crate::config::Strategy;
use crate::health::HealthState;
use crate::metrics::MetricsCollector;
use crate::stats::RequestStats;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Marker for "nothing selected yet"; backend ids start at 1.
const NO_SELECTION: BackendId = 0;

/// Selects backends according to the configured strategy.
pub struct LoadBalancer {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthState>,
    stats: Arc<RequestStats>,
    metrics: MetricsCollector,
    strategy: RwLock<Arc<dyn SelectionStrategy>>,
    /// In-flight requests per backend.
    connections: DashMap<BackendId, AtomicU32>,
    last_selected: AtomicU64,
}

impl LoadBalancer {
    pub fn new(
        registry: Arc<BackendRegistry>,
        health: Arc<HealthState>,
        stats: Arc<RequestStats>,
        metrics: MetricsCollector,
        strategy: Strategy,
    ) -> Self {
        Self {
            registry,
            health,
            stats,
            metrics,
            strategy: RwLock::new(Arc::from(strategies::build(strategy))),
            connections: DashMap::new(),
            last_selected: AtomicU64::new(NO_SELECTION),
        }
    }

    /// The active strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy.read().kind()
    }

    /// Switch strategy by name. Unknown names are rejected without change.
    pub fn set_strategy(&self, name: &str) -> bool {
        match name.parse::<Strategy>() {
            Ok(strategy) => {
                self.set_strategy_kind(strategy);
                true
            }
            Err(e) => {
                warn!(error = %e, "rejected strategy change");
                false
            }
        }
    }

    pub fn set_strategy_kind(&self, strategy: Strategy) {
        let mut slot = self.strategy.write();
        if slot.kind() != strategy {
            *slot = Arc::from(strategies::build(strategy));
            info!(strategy = %strategy, "load balancing strategy changed");
        }
    }

    /// Select a backend for the next request.
    ///
    /// When no backend is eligible the first registered backend is returned
    /// anyway. `None` only when the registry is empty.
    pub fn select_backend(&self) -> Option<Backend> {
        self.select(&[], true)
    }

    /// Select an eligible backend not in `exclude`, or `None` if there is none.
    pub fn select_excluding(&self, exclude: &[BackendId]) -> Option<Backend> {
        self.select(exclude, false)
    }

    /// Eligible backends with the state strategies score them on.
    pub fn candidates(&self, exclude: &[BackendId]) -> Vec<Candidate> {
        self.registry
            .snapshot()
            .iter()
            .filter(|b| !exclude.contains(&b.id) && self.health.is_eligible(b.id))
            .map(|b| Candidate {
                backend: b.clone(),
                health: self.health.record(b.id),
                connections: self.connection_count(b.id),
            })
            .collect()
    }

    fn select(&self, exclude: &[BackendId], degrade: bool) -> Option<Backend> {
        let mut candidates = self.candidates(exclude);

        let chosen = match candidates.len() {
            0 => {
                if !degrade {
                    return None;
                }
                let first = self.registry.first()?;
                warn!(
                    backend_id = first.id,
                    "no eligible backends, falling back to first registered backend"
                );
                first
            }
            1 => candidates.swap_remove(0).backend,
            _ => {
                let strategy = Arc::clone(&self.strategy.read());
                let idx = strategy.select(&candidates).unwrap_or(0);
                candidates.swap_remove(idx).backend
            }
        };

        self.record_selection(&chosen);
        debug!(backend_id = chosen.id, url = %chosen.base_url, "selected backend");
        Some(chosen)
    }

    fn record_selection(&self, backend: &Backend) {
        self.connections
            .entry(backend.id)
            .or_insert_with(|| AtomicU32::new(0))
            .fetch_add(1, Ordering::Relaxed);

        let previous = self.last_selected.swap(backend.id, Ordering::Relaxed);
        if previous != NO_SELECTION && previous != backend.id {
            self.stats.record_switch();
            self.metrics.record_backend_switch();
        }
    }

    /// Mark a request dispatched by `select*` as finished.
    pub fn release(&self, id: BackendId) {
        if let Some(counter) = self.connections.get(&id) {
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_sub(1));
        }
    }

    /// In-flight requests attributed to a backend.
    pub fn connection_count(&self, id: BackendId) -> u32 {
        self.connections
            .get(&id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Drop the counter of a removed backend.
    pub fn forget(&self, id: BackendId) {
        self.connections.remove(&id);
    }
}
