//! Backend registry.
//!
//! Holds the candidate backend deployments. Readers take a lock-free
//! snapshot; the rare admin add/remove swaps in a new list.

use crate::config::BackendConfig;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Stable backend identifier.
pub type BackendId = u64;

/// A registered backend deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backend {
    pub id: BackendId,
    pub base_url: String,
    pub label: String,
}

impl Backend {
    /// Join a request path onto this backend's base URL.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// Errors raised while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no backends configured")]
    Empty,
}

/// The set of backends known to this process, in registry order.
pub struct BackendRegistry {
    backends: ArcSwap<Vec<Backend>>,
    /// Serializes writers and hands out ids; never reused after removal.
    next_id: Mutex<BackendId>,
}

impl BackendRegistry {
    /// Build the registry from configuration, assigning ids 1..=N in file order.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, RegistryError> {
        if configs.is_empty() {
            return Err(RegistryError::Empty);
        }

        let backends: Vec<Backend> = configs
            .iter()
            .zip(1..)
            .map(|(cfg, id)| Backend {
                id,
                base_url: cfg.url.trim_end_matches('/').to_string(),
                label: cfg.label.clone(),
            })
            .collect();
        let next_id = backends.len() as BackendId + 1;

        Ok(Self {
            backends: ArcSwap::from_pointee(backends),
            next_id: Mutex::new(next_id),
        })
    }

    /// Current backends, in registry order.
    pub fn snapshot(&self) -> Arc<Vec<Backend>> {
        self.backends.load_full()
    }

    /// Look up a backend by id.
    pub fn get(&self, id: BackendId) -> Option<Backend> {
        self.backends.load().iter().find(|b| b.id == id).cloned()
    }

    /// Look up a backend by base URL (trailing slash ignored).
    pub fn find_by_url(&self, url: &str) -> Option<Backend> {
        let url = url.trim_end_matches('/');
        self.backends.load().iter().find(|b| b.base_url == url).cloned()
    }

    /// The first registered backend, used as the last-resort selection.
    pub fn first(&self) -> Option<Backend> {
        self.backends.load().first().cloned()
    }

    pub fn len(&self) -> usize {
        self.backends.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.load().is_empty()
    }

    /// Register a new backend at the end of registry order.
    pub fn add(&self, base_url: &str, label: &str) -> Backend {
        let mut next_id = self.next_id.lock();
        let backend = Backend {
            id: *next_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            label: label.to_string(),
        };
        *next_id += 1;

        let mut backends = Vec::clone(&self.backends.load());
        backends.push(backend.clone());
        self.backends.store(Arc::new(backends));

        info!(backend_id = backend.id, url = %backend.base_url, "backend added");
        backend
    }

    /// Change a backend's label in place, keeping its id and health history.
    pub fn relabel(&self, id: BackendId, label: &str) -> Option<Backend> {
        let _guard = self.next_id.lock();
        let current = self.backends.load();
        let position = current.iter().position(|b| b.id == id)?;

        let mut backends = Vec::clone(&current);
        let previous = std::mem::replace(&mut backends[position].label, label.to_string());
        let updated = backends[position].clone();
        self.backends.store(Arc::new(backends));

        info!(backend_id = id, from = %previous, to = %label, "backend relabeled");
        Some(updated)
    }

    /// Remove a backend. Unknown ids are a no-op returning `None`.
    pub fn remove(&self, id: BackendId) -> Option<Backend> {
        let _guard = self.next_id.lock();
        let current = self.backends.load();
        let position = current.iter().position(|b| b.id == id)?;

        let mut backends = Vec::clone(&current);
        let removed = backends.remove(position);
        self.backends.store(Arc::new(backends));

        info!(backend_id = id, url = %removed.base_url, "backend removed");
        Some(removed)
    }
}
