//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    routing::post,
    Router,
};
use jmespath_proxy::config::ProxyConfig;
use jmespath_proxy::http::HttpServer;
use jmespath_proxy::observability::{ForwardErrorKind, ForwardMetrics};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// A request received by the mock upstream.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// A running mock upstream that records what it receives.
pub struct MockUpstream {
    pub url: String,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockUpstream {
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().unwrap().clone()
    }
}

/// Start an upstream on an ephemeral port that answers every `POST /hook`
/// with a fixed response.
pub async fn start_upstream(status: u16, content_type: &'static str, body: &'static str) -> MockUpstream {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();

    let app = Router::new().route(
        "/hook",
        post(move |headers: HeaderMap, request_body: Bytes| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(CapturedRequest {
                    headers,
                    body: request_body,
                });
                (
                    StatusCode::from_u16(status).unwrap(),
                    [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
                    body,
                )
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream {
        url: format!("http://{addr}/hook"),
        captured,
    }
}

/// A URL nothing is listening on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/hook")
}

/// Forwarding metrics captured in memory.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    forwarded: Mutex<Vec<Vec<(String, String)>>>,
    errors: Mutex<Vec<ForwardErrorKind>>,
    durations: AtomicUsize,
}

impl RecordingMetrics {
    pub fn forwarded(&self) -> Vec<Vec<(String, String)>> {
        self.forwarded.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ForwardErrorKind> {
        self.errors.lock().unwrap().clone()
    }

    pub fn durations(&self) -> usize {
        self.durations.load(Ordering::SeqCst)
    }
}

impl ForwardMetrics for RecordingMetrics {
    fn record_forwarded(&self, labels: &[(String, String)]) {
        self.forwarded.lock().unwrap().push(labels.to_vec());
    }

    fn record_error(&self, kind: ForwardErrorKind) {
        self.errors.lock().unwrap().push(kind);
    }

    fn record_duration(&self, _elapsed: Duration) {
        self.durations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Router for `config`, recording forwarding metrics into the returned sink.
pub fn app(config: ProxyConfig) -> (Router, Arc<RecordingMetrics>) {
    let metrics = Arc::new(RecordingMetrics::default());
    let server = HttpServer::with_metrics(config, None, metrics.clone()).unwrap();
    (server.router(), metrics)
}

/// A collected response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn post_json(router: Router, uri: &str, body: &Value) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(router, request).await
}

pub async fn get(router: Router, uri: &str) -> TestResponse {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}
