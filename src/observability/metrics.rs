//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus recorder with per-metric histogram buckets
//! - Record forwarding outcomes and inbound request latency
//! - Render the text exposition for `GET /metrics`
//!
//! # Metrics
//! - `jmespath_proxy_forwarded_total` (counter): successful forwards, labelled
//!   by the metrics annotation expression when one is configured
//! - `jmespath_proxy_forward_errors_total` (counter): failed forwards by `error_type`
//! - `jmespath_proxy_forward_duration_seconds` (histogram): one upstream call
//! - `jmespath_proxy_requests_total` (counter): inbound requests by method, path, status
//! - `jmespath_proxy_request_duration_seconds` (histogram): inbound latency
//!
//! # Design Decisions
//! - Forwarding metrics go through [`ForwardMetrics`] so tests can record
//!   calls without a global recorder
//! - Counters are the `metrics` facade's atomics; nothing here locks

use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram, Label, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const FORWARDED_TOTAL: &str = "jmespath_proxy_forwarded_total";
pub const FORWARD_ERRORS_TOTAL: &str = "jmespath_proxy_forward_errors_total";
pub const FORWARD_DURATION_SECONDS: &str = "jmespath_proxy_forward_duration_seconds";
pub const REQUESTS_TOTAL: &str = "jmespath_proxy_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "jmespath_proxy_request_duration_seconds";

/// Upper bounds for the forward histogram; `+Inf` is added by the exporter.
pub const FORWARD_DURATION_BUCKETS: &[f64] =
    &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

pub const REQUEST_DURATION_BUCKETS: &[f64] =
    &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Install the global Prometheus recorder.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(FORWARD_DURATION_SECONDS.to_string()),
            FORWARD_DURATION_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            REQUEST_DURATION_BUCKETS,
        )?
        .install_recorder()?;

    describe_counter!(
        FORWARDED_TOTAL,
        "Total number of messages successfully forwarded."
    );
    describe_counter!(
        FORWARD_ERRORS_TOTAL,
        "Total number of errors encountered during forwarding."
    );
    describe_histogram!(
        FORWARD_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of forwarded HTTP requests in seconds."
    );
    describe_counter!(REQUESTS_TOTAL, "Total number of inbound HTTP requests.");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Inbound HTTP request latency in seconds."
    );

    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

/// Drain histogram buffers periodically so scrapes stay cheap.
pub fn spawn_upkeep(handle: PrometheusHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
        loop {
            interval.tick().await;
            handle.run_upkeep();
        }
    })
}

/// Why a forward failed, as reported in `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardErrorKind {
    Config,
    Http,
    Unexpected,
}

impl ForwardErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ForwardErrorKind::Config => "config_error",
            ForwardErrorKind::Http => "http_error",
            ForwardErrorKind::Unexpected => "unexpected_error",
        }
    }
}

/// Sink for forwarding metrics.
pub trait ForwardMetrics: Send + Sync {
    /// A forward succeeded. `labels` is empty when no labels are configured.
    fn record_forwarded(&self, labels: &[(String, String)]);

    fn record_error(&self, kind: ForwardErrorKind);

    /// Time spent on one upstream call.
    fn record_duration(&self, elapsed: Duration);
}

/// Records through the global `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl ForwardMetrics for PrometheusMetrics {
    fn record_forwarded(&self, labels: &[(String, String)]) {
        if labels.is_empty() {
            counter!(FORWARDED_TOTAL).increment(1);
        } else {
            let labels: Vec<Label> = labels
                .iter()
                .map(|(name, value)| Label::new(name.clone(), value.clone()))
                .collect();
            counter!(FORWARDED_TOTAL, labels).increment(1);
        }
    }

    fn record_error(&self, kind: ForwardErrorKind) {
        counter!(FORWARD_ERRORS_TOTAL, "error_type" => kind.as_str()).increment(1);
    }

    fn record_duration(&self, elapsed: Duration) {
        histogram!(FORWARD_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }
}

/// Record an inbound request.
pub fn record_request(method: &str, path: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status_code" => status.clone()
    )
    .increment(1);
    histogram!(
        REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status_code" => status
    )
    .record(start.elapsed().as_secs_f64());
}
