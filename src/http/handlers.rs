//! Route handlers.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::forward::ForwardOutcome;
use crate::http::response::{relay, transform_result, ErrorBody};
use crate::http::server::AppState;
use crate::transform::{self, QueryParams};

const INDEX_TEMPLATE: &str = include_str!("../../static/index.html");
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// `GET /`: the interactive test page.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(state.transform.source()))
}

fn render_index(default_expression: &str) -> String {
    INDEX_TEMPLATE.replace(
        "{{ default_expression }}",
        &html_escape::encode_double_quoted_attribute(default_expression),
    )
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// `GET /health`: liveness only.
pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "healthy" })
}

/// `POST /`: transform, then forward.
pub async fn forward_json(
    State(state): State<AppState>,
    Query(query_params): Query<QueryParams>,
    Json(data): Json<Map<String, Value>>,
) -> Response {
    let body = Value::Object(data);
    tracing::info!(data = %body, "Forward endpoint received data");
    tracing::info!(query_params = ?query_params, "Query parameters");

    let payload = match state.transform.apply(&body, &query_params) {
        Ok(payload) => payload,
        Err(error) => {
            return ErrorBody {
                error: format!("Error in global expression: {error}"),
                original_data: body,
                query_params,
            }
            .into_response();
        }
    };
    tracing::info!(payload = %payload, "Final payload for forwarding");

    let label_values = state.labels.extract(&body, &query_params);

    match state.forwarder.forward(&payload, &label_values).await {
        ForwardOutcome::Forwarded(upstream) => relay(upstream),
        failure => ErrorBody {
            error: failure.error_message().unwrap_or_default(),
            original_data: payload,
            query_params,
        }
        .into_response(),
    }
}

/// Body of `POST /test`.
#[derive(Debug, Deserialize)]
pub struct TestPayload {
    pub data: Map<String, Value>,
    #[serde(default)]
    pub expression: Option<String>,
}

/// `POST /test`: transform only, with an optional per-request expression.
pub async fn test_expression(
    State(state): State<AppState>,
    Query(query_params): Query<QueryParams>,
    Json(payload): Json<TestPayload>,
) -> Response {
    let data = Value::Object(payload.data);
    tracing::info!(data = %data, "Test endpoint received data");
    tracing::info!(query_params = ?query_params, "Query parameters");

    let result = match payload.expression.as_deref().filter(|e| !e.is_empty()) {
        Some(expression) => {
            tracing::info!(expression = %expression, "Test endpoint using expression");
            transform::apply(expression, &data, &query_params)
        }
        None => {
            let source = match state.transform.source() {
                "" => "[No Expression]",
                source => source,
            };
            tracing::info!(expression = %source, "Test endpoint using expression");
            state.transform.apply(&data, &query_params)
        }
    };

    match result {
        Ok(value) => transform_result(value),
        Err(error) => ErrorBody {
            error: error.to_string(),
            original_data: data,
            query_params,
        }
        .into_response(),
    }
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
            )],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
