//! Response shaping.
//!
//! # Responsibilities
//! - In-band error bodies (`{error, original_data, query_params}`, always 200)
//! - Relay upstream responses to the client
//! - Render transform results for `POST /test`
//!
//! # Design Decisions
//! - Hop-by-hop headers and `content-length` are stripped from relayed
//!   responses; the framework recomputes the length
//! - Relayed JSON is re-encoded but keeps the upstream content type

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::forward::{RelayBody, UpstreamResponse};
use crate::transform::QueryParams;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Error reported in-band with status 200.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    pub original_data: Value,
    pub query_params: QueryParams,
}

impl IntoResponse for ErrorBody {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Turn an upstream response into ours.
pub fn relay(upstream: UpstreamResponse) -> Response {
    let UpstreamResponse {
        status,
        headers,
        body,
    } = upstream;

    let body = match body {
        RelayBody::Json(value) => match serde_json::to_vec(&value) {
            Ok(bytes) => Body::from(bytes),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode upstream JSON");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
        RelayBody::Raw(bytes) => Body::from(bytes),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = relayable_headers(&headers);
    response
}

fn relayable_headers(headers: &HeaderMap) -> HeaderMap {
    // Headers named by `Connection` are hop-by-hop too.
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    let mut relayed = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower)
            || *name == header::CONTENT_LENGTH
            || listed.iter().any(|l| l == lower)
        {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }
    relayed
}

/// Render a transform result: strings as plain text, everything else as JSON.
pub fn transform_result(value: Value) -> Response {
    match value {
        Value::String(text) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            text,
        )
            .into_response(),
        other => Json(other).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Bytes};
    use axum::http::HeaderName;

    fn upstream(headers: &[(&str, &str)], body: RelayBody) -> UpstreamResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        UpstreamResponse {
            status: StatusCode::ACCEPTED,
            headers: map,
            body,
        }
    }

    #[tokio::test]
    async fn test_relay_strips_hop_by_hop_headers() {
        let response = relay(upstream(
            &[
                ("content-type", "application/json"),
                ("content-length", "999"),
                ("connection", "keep-alive, x-internal"),
                ("keep-alive", "timeout=5"),
                ("transfer-encoding", "chunked"),
                ("x-internal", "secret"),
                ("x-upstream", "yes"),
            ],
            RelayBody::Json(serde_json::json!({"result": "success"})),
        ));

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let headers = response.headers();
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-upstream"], "yes");
        for stripped in ["content-length", "connection", "keep-alive", "transfer-encoding", "x-internal"] {
            assert!(!headers.contains_key(stripped), "{stripped} relayed");
        }

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"result":"success"}"#);
    }

    #[tokio::test]
    async fn test_relay_raw_body_verbatim() {
        let response = relay(upstream(
            &[("content-type", "text/csv")],
            RelayBody::Raw(Bytes::from_static(b"a,b\n1,2\n")),
        ));
        assert_eq!(response.headers()["content-type"], "text/csv");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_string_results_are_plain_text() {
        let response = transform_result(Value::String("John".into()));
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"John");

        let response = transform_result(serde_json::json!([1, 2]));
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_error_body_is_200() {
        let response = ErrorBody {
            error: "nope".into(),
            original_data: serde_json::json!({"a": 1}),
            query_params: QueryParams::new(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"error": "nope", "original_data": {"a": 1}, "query_params": {}})
        );
    }
}
