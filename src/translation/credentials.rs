//! Provider account credentials and the rotating cursor over them.

use crate::config::CredentialConfig;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One provider account.
#[derive(Clone)]
pub struct Credential {
    pub account_id: String,
    pub api_key: String,
    pub label: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("api_key", &"<redacted>")
            .field("label", &self.label)
            .finish()
    }
}

/// Credentials handed out round-robin.
///
/// The cursor advances on every acquisition whether or not the call made
/// with the credential succeeds.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Unlabelled entries are named after their position.
    pub fn from_config(configs: &[CredentialConfig]) -> Self {
        let credentials = configs
            .iter()
            .enumerate()
            .map(|(i, c)| Credential {
                account_id: c.account_id.clone(),
                api_key: c.api_key.clone(),
                label: if c.label.trim().is_empty() {
                    format!("account-{}", i + 1)
                } else {
                    c.label.clone()
                },
            })
            .collect();
        Self::new(credentials)
    }

    /// Next credential in rotation with its position, `None` for an empty pool.
    pub fn acquire(&self) -> Option<(usize, &Credential)> {
        if self.credentials.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.credentials.len();
        self.credentials.get(idx).map(|c| (idx, c))
    }

    /// The credential following position `idx`, wrapping around.
    ///
    /// Independent of the shared cursor, so concurrent acquisitions cannot
    /// steer a failover back onto the account that just failed.
    pub fn next_after(&self, idx: usize) -> Option<(usize, &Credential)> {
        if self.credentials.is_empty() {
            return None;
        }
        let next = (idx + 1) % self.credentials.len();
        self.credentials.get(next).map(|c| (next, c))
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.credentials.iter().map(|c| c.label.as_str()).collect()
    }
}
