//! Upstream forwarding.
//!
//! # Responsibilities
//! - Own the single outbound HTTP client for the process
//! - POST the (possibly transformed) payload to the configured URL
//! - Classify failures and record forwarding metrics
//!
//! # Design Decisions
//! - Exactly one attempt per request; no retries
//! - Every failure becomes a [`ForwardOutcome`] variant; nothing propagates
//!   past this boundary
//! - A missing URL is reported without touching the network or the
//!   duration histogram
//!
//! # Data Flow
//! ```text
//! payload → Forwarder::forward
//!     → (no URL) ConfigError
//!     → reqwest POST ──timed──▶ UpstreamError | UnexpectedError | Forwarded
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use thiserror::Error;

use crate::config::ForwardConfig;
use crate::observability::metrics::{ForwardErrorKind, ForwardMetrics};
use crate::transform::{LabelSet, LabelValues};

/// Failure to build the outbound client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid forward timeout {0}")]
    InvalidTimeout(f64),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Upstream response body, decoded when it is JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayBody {
    Json(Value),
    Raw(Bytes),
}

/// A 2xx response from upstream.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: RelayBody,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

/// Result of one forwarding attempt.
#[derive(Debug, Clone)]
pub enum ForwardOutcome {
    Forwarded(UpstreamResponse),
    /// No upstream URL configured.
    ConfigError,
    /// Transport failure or non-2xx status.
    UpstreamError {
        message: String,
        status: Option<u16>,
    },
    /// Anything else, e.g. the request could not be built.
    UnexpectedError { message: String },
}

impl ForwardOutcome {
    /// Message for the in-band error body, `None` on success.
    pub fn error_message(&self) -> Option<String> {
        match self {
            ForwardOutcome::Forwarded(_) => None,
            ForwardOutcome::ConfigError => Some(
                "Configuration error: FORWARD_URL environment variable is not set".to_string(),
            ),
            ForwardOutcome::UpstreamError { message, .. } => {
                Some(format!("Failed to forward request: {message}"))
            }
            ForwardOutcome::UnexpectedError { message } => {
                Some(format!("Unexpected error during forwarding: {message}"))
            }
        }
    }
}

/// Sends payloads upstream.
pub struct Forwarder {
    client: reqwest::Client,
    config: ForwardConfig,
    labels: Arc<LabelSet>,
    metrics: Arc<dyn ForwardMetrics>,
}

impl Forwarder {
    pub fn new(
        config: ForwardConfig,
        labels: Arc<LabelSet>,
        metrics: Arc<dyn ForwardMetrics>,
    ) -> Result<Self, ClientError> {
        let timeout = Duration::try_from_secs_f64(config.timeout_secs)
            .map_err(|_| ClientError::InvalidTimeout(config.timeout_secs))?;

        let mut builder = reqwest::Client::builder().timeout(timeout);
        if !config.verify_ssl {
            tracing::warn!("SSL verification is disabled. This is insecure!");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            config,
            labels,
            metrics,
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Forward `payload` once and record the outcome.
    pub async fn forward(&self, payload: &Value, label_values: &LabelValues) -> ForwardOutcome {
        if self.config.url.is_empty() {
            tracing::error!(
                detail = "FORWARD_URL environment variable is not set",
                "Configuration error"
            );
            self.metrics.record_error(ForwardErrorKind::Config);
            return ForwardOutcome::ConfigError;
        }

        let start = Instant::now();
        let outcome = self.send(payload).await;
        self.metrics.record_duration(start.elapsed());

        match &outcome {
            ForwardOutcome::Forwarded(response) => {
                tracing::info!(
                    url = %self.config.url,
                    status_code = response.status.as_u16(),
                    "Request forwarded successfully"
                );
                self.metrics
                    .record_forwarded(&self.labels.resolve(label_values));
            }
            ForwardOutcome::UpstreamError { .. } => {
                self.metrics.record_error(ForwardErrorKind::Http);
            }
            ForwardOutcome::UnexpectedError { .. } => {
                self.metrics.record_error(ForwardErrorKind::Unexpected);
            }
            ForwardOutcome::ConfigError => {}
        }
        outcome
    }

    async fn send(&self, payload: &Value) -> ForwardOutcome {
        let url = &self.config.url;

        let mut request = self.client.post(url).json(payload);
        if let Some((username, password)) = self.config.basic_auth() {
            tracing::info!(url = %url, "Using basic auth for request");
            request = request.basic_auth(username, Some(password));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return self.unexpected(e),
            Err(e) => {
                tracing::error!(error = %e, url = %url, "Forwarding failed");
                return ForwardOutcome::UpstreamError {
                    message: e.to_string(),
                    status: None,
                };
            }
        };

        let status = response.status();
        if let Some(e) = response.error_for_status_ref().err() {
            let upstream_content = response.text().await.unwrap_or_default();
            tracing::error!(
                error = %e,
                url = %url,
                upstream_content = %upstream_content,
                status_code = status.as_u16(),
                "Forwarding failed"
            );
            return ForwardOutcome::UpstreamError {
                message: e.to_string(),
                status: Some(status.as_u16()),
            };
        }

        let headers = response.headers().clone();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, url = %url, "Failed to read upstream response");
                return ForwardOutcome::UpstreamError {
                    message: e.to_string(),
                    status: Some(status.as_u16()),
                };
            }
        };

        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let body = if is_json {
            match serde_json::from_slice(&bytes) {
                Ok(value) => RelayBody::Json(value),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        url = %url,
                        status_code = status.as_u16(),
                        "Failed to parse upstream JSON"
                    );
                    RelayBody::Raw(bytes)
                }
            }
        } else {
            RelayBody::Raw(bytes)
        };

        ForwardOutcome::Forwarded(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    fn unexpected(&self, error: impl std::fmt::Display) -> ForwardOutcome {
        tracing::error!(error = %error, url = %self.config.url, "Unexpected forwarding error");
        ForwardOutcome::UnexpectedError {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ForwardOutcome::ConfigError.error_message().unwrap(),
            "Configuration error: FORWARD_URL environment variable is not set"
        );
        let upstream = ForwardOutcome::UpstreamError {
            message: "boom".into(),
            status: Some(500),
        };
        assert_eq!(
            upstream.error_message().unwrap(),
            "Failed to forward request: boom"
        );
        let unexpected = ForwardOutcome::UnexpectedError {
            message: "bad".into(),
        };
        assert_eq!(
            unexpected.error_message().unwrap(),
            "Unexpected error during forwarding: bad"
        );
    }

    #[test]
    fn test_rejects_unrepresentable_timeout() {
        let config = ForwardConfig {
            timeout_secs: -1.0,
            ..Default::default()
        };
        let result = Forwarder::new(
            config,
            Arc::new(LabelSet::default()),
            Arc::new(crate::observability::PrometheusMetrics),
        );
        assert!(matches!(result, Err(ClientError::InvalidTimeout(_))));
    }
}
