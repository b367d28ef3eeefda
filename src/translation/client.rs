//! Translation client with account-level failover.

use super::credentials::{Credential, CredentialPool};
use super::history::{record_detached, HistoryEntry, HistorySink};
use super::languages::lookup_language;
use super::provider::{CloudflareProvider, ProviderRequest, TranslationProvider};
use crate::config::TranslationConfig;
use crate::metrics::MetricsCollector;
use crate::transport::Transport;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors from [`TranslationClient::translate`].
///
/// Everything except `Exhausted` is a precondition failure detected before
/// any provider call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("text must not be empty")]
    EmptyText,

    #[error("text is {len} characters, the limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("no provider credentials configured")]
    NoCredentials,

    #[error("translation failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl TranslateError {
    pub fn is_precondition(&self) -> bool {
        !matches!(self, TranslateError::Exhausted { .. })
    }
}

/// A successful translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub translated_text: String,
    pub source_lang: Option<String>,
    pub target_lang: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationSettings {
    /// Upper bound on provider calls for one `translate()`.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_text_length: usize,
}

impl From<&TranslationConfig> for TranslationSettings {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay,
            max_text_length: config.max_text_length,
        }
    }
}

pub struct TranslationClient {
    pool: CredentialPool,
    provider: Arc<dyn TranslationProvider>,
    settings: TranslationSettings,
    metrics: MetricsCollector,
    history: Option<Arc<dyn HistorySink>>,
}

impl TranslationClient {
    pub fn new(
        pool: CredentialPool,
        provider: Arc<dyn TranslationProvider>,
        settings: TranslationSettings,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            pool,
            provider,
            settings,
            metrics,
            history: None,
        }
    }

    /// Client talking to Workers AI through `transport`.
    pub fn from_config(
        config: &TranslationConfig,
        transport: Arc<dyn Transport>,
        metrics: MetricsCollector,
    ) -> Self {
        let provider = CloudflareProvider::new(
            transport,
            config.base_url.clone(),
            config.model.clone(),
            config.timeout,
        );
        Self::new(
            CredentialPool::from_config(&config.credentials),
            Arc::new(provider),
            TranslationSettings::from(config),
            metrics,
        )
    }

    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn credential_labels(&self) -> Vec<&str> {
        self.pool.labels()
    }

    /// Translate `text` into `target_lang`.
    ///
    /// Preconditions are checked before any network call. The first failure
    /// fails over to the next account when there is more than one; later
    /// failures retry the same account after `retry_delay`.
    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Result<Translation, TranslateError> {
        self.check_text(text)?;
        let target = lookup_language(target_lang)
            .ok_or_else(|| TranslateError::UnsupportedLanguage(target_lang.to_string()))?;
        let source = source_lang
            .filter(|s| !s.trim().is_empty())
            .map(|s| lookup_language(s).ok_or_else(|| TranslateError::UnsupportedLanguage(s.to_string())))
            .transpose()?;

        let request = ProviderRequest {
            text,
            source_lang: source.map(|l| l.code),
            target_lang: target.code,
        };

        let (slot, mut credential) =
            self.pool.acquire().ok_or(TranslateError::NoCredentials)?;
        let mut attempts = 0;
        let mut last_error;

        loop {
            attempts += 1;
            match self.call(credential, &request, attempts).await {
                Ok(translated_text) => {
                    let translation = Translation {
                        translated_text,
                        source_lang: request.source_lang.map(str::to_string),
                        target_lang: target.code.to_string(),
                    };
                    self.record_history(text, &translation);
                    return Ok(translation);
                }
                Err(e) => last_error = e,
            }

            if attempts >= self.settings.max_retries {
                break;
            }

            if attempts == 1 && self.pool.len() > 1 {
                let (_, next) = self
                    .pool
                    .next_after(slot)
                    .ok_or(TranslateError::NoCredentials)?;
                info!(from = %credential.label, to = %next.label, "failing over to next provider account");
                credential = next;
            } else {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        error!(attempts, error = %last_error, "translation exhausted all attempts");
        Err(TranslateError::Exhausted {
            attempts,
            last_error,
        })
    }

    fn check_text(&self, text: &str) -> Result<(), TranslateError> {
        if text.trim().is_empty() {
            return Err(TranslateError::EmptyText);
        }
        let len = text.chars().count();
        if len > self.settings.max_text_length {
            return Err(TranslateError::TextTooLong {
                len,
                max: self.settings.max_text_length,
            });
        }
        Ok(())
    }

    async fn call(
        &self,
        credential: &Credential,
        request: &ProviderRequest<'_>,
        attempt: u32,
    ) -> Result<String, String> {
        debug!(account = %credential.label, attempt, target_lang = request.target_lang, "calling translation provider");
        let result = self.provider.translate(credential, request).await;
        self.metrics
            .record_translation_attempt(&credential.label, result.is_ok());

        result.map_err(|e| {
            warn!(account = %credential.label, attempt, error = %e, "translation attempt failed");
            e.to_string()
        })
    }

    fn record_history(&self, source_text: &str, translation: &Translation) {
        if let Some(sink) = &self.history {
            let entry = HistoryEntry::new(
                source_text,
                translation.translated_text.clone(),
                translation.source_lang.clone(),
                translation.target_lang.clone(),
            );
            record_detached(Arc::clone(sink), entry);
        }
    }
}
