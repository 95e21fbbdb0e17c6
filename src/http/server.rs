//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, metrics, body limit)
//! - Bind server to listener and shut down gracefully

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::forward::Forwarder;
use crate::http::handlers;
use crate::http::middleware::track_requests;
use crate::http::request::{make_span, MakeRequestUuid};
use crate::lifecycle::{build_state, shutdown_signal, StartupError};
use crate::observability::{ForwardMetrics, PrometheusMetrics};
use crate::transform::{LabelSet, Transform};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub transform: Arc<Transform>,
    pub labels: Arc<LabelSet>,
    pub forwarder: Arc<Forwarder>,
    /// Present when the Prometheus recorder is installed.
    pub metrics_handle: Option<PrometheusHandle>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server recording forwarding metrics globally.
    pub fn new(
        config: ProxyConfig,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self, StartupError> {
        Self::with_metrics(config, metrics_handle, Arc::new(PrometheusMetrics))
    }

    /// Create a new HTTP server with an explicit forwarding metrics sink.
    pub fn with_metrics(
        config: ProxyConfig,
        metrics_handle: Option<PrometheusHandle>,
        metrics: Arc<dyn ForwardMetrics>,
    ) -> Result<Self, StartupError> {
        let state = build_state(&config, metrics_handle, metrics)?;
        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(handlers::index).post(handlers::forward_json))
            .route("/health", get(handlers::health_check))
            .route("/test", post(handlers::test_expression))
            .route("/metrics", get(handlers::render_metrics))
            .route_layer(middleware::from_fn(track_requests))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.security.max_body_size))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(make_span))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The configured router, for serving or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}
