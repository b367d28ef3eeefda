//! Translation provider seam and the Workers AI implementation.

use super::credentials::Credential;
use crate::transport::{Method, OutboundRequest, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// What a single provider call carries.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest<'a> {
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_lang: Option<&'a str>,
    pub target_lang: &'a str,
}

/// Failure of one provider call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider reported failure: {0}")]
    Rejected(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A machine-translation backend reachable with one credential at a time.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        credential: &Credential,
        request: &ProviderRequest<'_>,
    ) -> Result<String, ProviderError>;
}

/// Cloudflare Workers AI text translation.
pub struct CloudflareProvider {
    transport: Arc<dyn Transport>,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    success: bool,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunResult {
    translated_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    message: String,
}

/// Longest error body kept in a [`ProviderError::Status`].
const MAX_ERROR_BODY: usize = 256;

impl CloudflareProvider {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        }
    }

    fn endpoint(&self, credential: &Credential) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url, credential.account_id, self.model
        )
    }
}

#[async_trait]
impl TranslationProvider for CloudflareProvider {
    async fn translate(
        &self,
        credential: &Credential,
        request: &ProviderRequest<'_>,
    ) -> Result<String, ProviderError> {
        let body = serde_json::to_vec(request).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let outbound = OutboundRequest {
            method: Method::POST,
            url: self.endpoint(credential),
            headers: vec![(
                "authorization".to_string(),
                format!("Bearer {}", credential.api_key),
            )],
            body: Some(Bytes::from(body)),
            timeout: self.timeout,
        };

        let response = self.transport.send(outbound).await?;
        if !response.is_success() {
            let mut body = String::from_utf8_lossy(&response.body).into_owned();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
                body.truncate(cut);
            }
            return Err(ProviderError::Status {
                status: response.status,
                body,
            });
        }

        let parsed: RunResponse = response
            .json()
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        if !parsed.success {
            let message = parsed
                .errors
                .into_iter()
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ProviderError::Rejected(if message.is_empty() {
                "success=false".to_string()
            } else {
                message
            }));
        }

        parsed
            .result
            .and_then(|r| r.translated_text)
            .ok_or_else(|| ProviderError::Malformed("missing result.translated_text".to_string()))
    }
}
