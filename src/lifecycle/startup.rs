//! Startup orchestration.
//!
//! # Responsibilities
//! - Compile the configured expressions once and log the result
//! - Build the outbound client and shared handler state
//!
//! # Design Decisions
//! - Configuration and client errors are fatal
//! - Expression errors are not: an invalid transform is kept and reported
//!   on every request, an invalid label expression just disables labels

use std::sync::Arc;

use metrics_exporter_prometheus::{BuildError, PrometheusHandle};
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::forward::{ClientError, Forwarder};
use crate::http::server::AppState;
use crate::observability::ForwardMetrics;
use crate::transform::{LabelSet, Transform};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compile the global expression, logging how it went.
pub fn compile_transform(source: &str) -> Transform {
    let transform = Transform::compile(source);
    match &transform {
        Transform::Passthrough => {
            tracing::info!("No JMESPATH_EXPRESSION environment variable set.");
        }
        Transform::Compiled(expression) => {
            tracing::info!(expression = %expression, "Successfully compiled JMESPATH_EXPRESSION");
        }
        Transform::Invalid { source, error } => {
            tracing::error!(error = %error, expression = %source, "Invalid JMESPATH_EXPRESSION");
        }
    }
    transform
}

/// Assemble the state shared by every handler.
pub fn build_state(
    config: &ProxyConfig,
    metrics_handle: Option<PrometheusHandle>,
    metrics: Arc<dyn ForwardMetrics>,
) -> Result<AppState, StartupError> {
    let transform = Arc::new(compile_transform(&config.transform.expression));
    let labels = Arc::new(LabelSet::from_expression(
        &config.transform.metrics_annotation_expression,
    ));
    let forwarder = Forwarder::new(config.forward.clone(), labels.clone(), metrics)?;

    tracing::info!(
        forward_url = %forwarder.url(),
        timeout_secs = config.forward.timeout_secs,
        verify_ssl = config.forward.verify_ssl,
        labels = ?labels.names(),
        "Forwarder configured"
    );

    Ok(AppState {
        transform,
        labels,
        forwarder: Arc::new(forwarder),
        metrics_handle,
    })
}
