//! Keep-alive scheduler.
//!
//! Idle backends on free hosting tiers get suspended. Instead of probing
//! every backend all the time, a small active set is probed on each tick and
//! rotated periodically so every backend is touched within a bounded window.

use super::active_set::ActiveSet;
use crate::backend::{BackendId, BackendRegistry};
use crate::config::{KeepAliveConfig, ResourceLevel};
use crate::health::HealthProber;
use crate::metrics::MetricsCollector;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tunables derived from [`KeepAliveConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveSettings {
    pub level: ResourceLevel,
    pub max_active: usize,
    pub tick_interval: Duration,
    pub rotation_every: u32,
}

impl KeepAliveSettings {
    pub fn for_level(level: ResourceLevel, rotation_every: u32) -> Self {
        Self {
            level,
            max_active: level.max_active_backends(),
            tick_interval: level.tick_interval(),
            rotation_every: rotation_every.max(1),
        }
    }
}

impl From<&KeepAliveConfig> for KeepAliveSettings {
    fn from(config: &KeepAliveConfig) -> Self {
        let mut settings = Self::for_level(config.resource_level, config.rotation_every);
        if let Some(max_active) = config.max_active_backends {
            settings.max_active = max_active.max(1);
        }
        if let Some(tick_interval) = config.tick_interval {
            settings.tick_interval = tick_interval;
        }
        settings
    }
}

/// Scheduler state reported by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct KeepAliveStatus {
    pub running: bool,
    pub resource_level: ResourceLevel,
    pub max_active_backends: usize,
    pub tick_interval_secs: u64,
    pub ticks: u64,
    pub active_backends: Vec<BackendId>,
}

struct Inner {
    settings: KeepAliveSettings,
    active: ActiveSet,
}

struct Running {
    stop: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Probes a rotating subset of backends on a fixed tick.
pub struct KeepAliveScheduler {
    registry: Arc<BackendRegistry>,
    prober: Arc<HealthProber>,
    metrics: MetricsCollector,
    inner: Mutex<Inner>,
    ticks: AtomicU64,
    running: Mutex<Option<Running>>,
}

impl KeepAliveScheduler {
    pub fn new(
        registry: Arc<BackendRegistry>,
        prober: Arc<HealthProber>,
        metrics: MetricsCollector,
        settings: KeepAliveSettings,
    ) -> Self {
        let active = ActiveSet::initial(&Self::registry_ids(&registry), settings.max_active);
        Self {
            registry,
            prober,
            metrics,
            inner: Mutex::new(Inner { settings, active }),
            ticks: AtomicU64::new(0),
            running: Mutex::new(None),
        }
    }

    /// Start ticking. Returns false if already running.
    ///
    /// The active set is rebuilt from the current registry and probed
    /// immediately, then once per tick interval.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        {
            let mut inner = self.inner.lock();
            let max_active = inner.settings.max_active;
            inner.active = ActiveSet::initial(&Self::registry_ids(&self.registry), max_active);
            info!(
                active = ?inner.active.members(),
                level = ?inner.settings.level,
                interval = ?inner.settings.tick_interval,
                "keep-alive scheduler starting"
            );
        }

        let (stop, stop_rx) = broadcast::channel(1);
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.run(stop_rx).await });

        *running = Some(Running { stop, handle });
        true
    }

    /// Stop ticking. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        match self.running.lock().take() {
            Some(running) => {
                let _ = running.stop.send(());
                drop(running.handle);
                info!("keep-alive scheduler stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    async fn run(self: Arc<Self>, mut stop: broadcast::Receiver<()>) {
        self.probe_active().await;

        loop {
            // Re-read every iteration so level changes apply to the next tick.
            let interval = self.inner.lock().settings.tick_interval;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
                _ = stop.recv() => {
                    debug!("keep-alive loop exiting");
                    break;
                }
            }
        }
    }

    /// One keep-alive tick: rotate on every Nth tick, then probe the active set.
    pub async fn tick(&self) {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let registry = Self::registry_ids(&self.registry);

        {
            let mut inner = self.inner.lock();
            if tick % u64::from(inner.settings.rotation_every) == 0 {
                match inner.active.rotate(&registry) {
                    Some(rotation) => debug!(
                        tick,
                        added = rotation.added,
                        evicted = ?rotation.evicted,
                        "rotated active set"
                    ),
                    None => debug!(tick, "active set covers every backend, rotation skipped"),
                }
            }
        }

        self.probe_active().await;
    }

    async fn probe_active(&self) {
        let active = self.inner.lock().active.members();
        self.metrics.set_active_set_size(active.len());
        self.prober.probe_ids(&active).await;
    }

    /// Probe a backend outside the schedule and, if it answers, add it to the
    /// active set without evicting anyone.
    pub async fn wake_up_backend(&self, id: BackendId) -> bool {
        let Some(backend) = self.registry.get(id) else {
            warn!(backend_id = id, "wake-up requested for unknown backend");
            return false;
        };

        info!(backend_id = id, url = %backend.base_url, "waking backend");
        if !self.prober.probe_backend(&backend).await {
            warn!(backend_id = id, "backend did not answer wake-up probe");
            return false;
        }

        let size = {
            let mut inner = self.inner.lock();
            inner.active.insert(id);
            inner.active.len()
        };
        self.metrics.set_active_set_size(size);
        true
    }

    /// Switch resource level. The new interval applies from the next tick and
    /// the new size from the next rotation.
    pub fn adjust_resource_usage(&self, level: ResourceLevel) {
        let mut inner = self.inner.lock();
        let settings = KeepAliveSettings::for_level(level, inner.settings.rotation_every);
        if inner.settings == settings {
            return;
        }
        inner.active.set_max_active(settings.max_active);
        inner.settings = settings;
        info!(
            level = ?level,
            max_active = settings.max_active,
            interval = ?settings.tick_interval,
            "keep-alive resource level adjusted"
        );
    }

    /// Drop a removed backend from the active set.
    pub fn forget(&self, id: BackendId) {
        let size = {
            let mut inner = self.inner.lock();
            inner.active.remove(id);
            inner.active.len()
        };
        self.metrics.set_active_set_size(size);
    }

    pub fn active_backends(&self) -> Vec<BackendId> {
        self.inner.lock().active.members()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn settings(&self) -> KeepAliveSettings {
        self.inner.lock().settings
    }

    pub fn status(&self) -> KeepAliveStatus {
        let running = self.is_running();
        let inner = self.inner.lock();
        KeepAliveStatus {
            running,
            resource_level: inner.settings.level,
            max_active_backends: inner.settings.max_active,
            tick_interval_secs: inner.settings.tick_interval.as_secs(),
            ticks: self.ticks(),
            active_backends: inner.active.members(),
        }
    }

    fn registry_ids(registry: &BackendRegistry) -> Vec<BackendId> {
        registry.snapshot().iter().map(|b| b.id).collect()
    }
}

impl Drop for KeepAliveScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.handle.abort();
        }
    }
}
