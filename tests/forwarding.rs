//! End-to-end forwarding through `POST /`.

use axum::http::StatusCode;
use jmespath_proxy::config::ProxyConfig;
use jmespath_proxy::observability::ForwardErrorKind;
use serde_json::json;

mod common;

fn config_for(url: &str, expression: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.forward.url = url.to_string();
    config.forward.timeout_secs = 5.0;
    config.transform.expression = expression.to_string();
    config
}

#[tokio::test]
async fn test_missing_forward_url_is_config_error() {
    let (router, metrics) = common::app(config_for("", ""));
    let body = json!({"user": {"name": "John"}});

    let response = common::post_json(router, "/?team=core", &body).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({
            "error": "Configuration error: FORWARD_URL environment variable is not set",
            "original_data": body,
            "query_params": {"team": "core"}
        })
    );
    assert_eq!(metrics.errors(), vec![ForwardErrorKind::Config]);
    assert_eq!(metrics.durations(), 0);
    assert!(metrics.forwarded().is_empty());
}

#[tokio::test]
async fn test_transformed_payload_is_forwarded_and_response_relayed() {
    let upstream = common::start_upstream(200, "application/json", r#"{"result": "success"}"#).await;
    let (router, metrics) = common::app(config_for(&upstream.url, "body.user.name"));

    let response = common::post_json(router, "/", &json!({"user": {"name": "John"}})).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({"result": "success"}));

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].json(), json!("John"));
    assert_eq!(requests[0].headers["content-type"], "application/json");
    assert!(!requests[0].headers.contains_key("authorization"));

    assert_eq!(metrics.forwarded(), vec![Vec::<(String, String)>::new()]);
    assert!(metrics.errors().is_empty());
    assert_eq!(metrics.durations(), 1);
}

#[tokio::test]
async fn test_passthrough_forwards_original_body() {
    let upstream = common::start_upstream(202, "application/json", "{}").await;
    let (router, _metrics) = common::app(config_for(&upstream.url, ""));
    let body = json!({"alerts": [{"status": "firing"}]});

    let response = common::post_json(router, "/", &body).await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(upstream.requests()[0].json(), body);
}

#[tokio::test]
async fn test_upstream_error_status_echoes_transformed_payload() {
    let upstream = common::start_upstream(500, "text/plain", "upstream exploded").await;
    let (router, metrics) = common::app(config_for(&upstream.url, "body.user"));

    let response = common::post_json(router, "/?a=1", &json!({"user": {"name": "John"}})).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to forward request: "));
    assert_eq!(body["original_data"], json!({"name": "John"}));
    assert_eq!(body["query_params"], json!({"a": "1"}));

    assert_eq!(metrics.errors(), vec![ForwardErrorKind::Http]);
    assert_eq!(metrics.durations(), 1);
    assert!(metrics.forwarded().is_empty());
}

#[tokio::test]
async fn test_transport_failure_is_http_error() {
    let url = common::unreachable_url().await;
    let (router, metrics) = common::app(config_for(&url, ""));
    let body = json!({"k": "v"});

    let response = common::post_json(router, "/", &body).await;

    let json = response.json();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to forward request: "));
    assert_eq!(json["original_data"], body);
    assert_eq!(metrics.errors(), vec![ForwardErrorKind::Http]);
}

#[tokio::test]
async fn test_unbuildable_request_is_unexpected_error() {
    let (router, metrics) = common::app(config_for("not a url", ""));

    let response = common::post_json(router, "/", &json!({"k": "v"})).await;

    let json = response.json();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Unexpected error during forwarding: "));
    assert_eq!(metrics.errors(), vec![ForwardErrorKind::Unexpected]);
    assert_eq!(metrics.durations(), 1);
}

#[tokio::test]
async fn test_basic_auth_sent_only_with_both_credentials() {
    let upstream = common::start_upstream(200, "application/json", "{}").await;

    let mut config = config_for(&upstream.url, "");
    config.forward.basic_auth_username = "user".into();
    config.forward.basic_auth_password = "pass".into();
    let (router, _) = common::app(config);
    common::post_json(router, "/", &json!({})).await;

    let mut config = config_for(&upstream.url, "");
    config.forward.basic_auth_username = "user".into();
    let (router, _) = common::app(config);
    common::post_json(router, "/", &json!({})).await;

    let requests = upstream.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].headers["authorization"], "Basic dXNlcjpwYXNz");
    assert!(!requests[1].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_forwarded_counter_labels() {
    let upstream = common::start_upstream(200, "application/json", "{}").await;
    let mut config = config_for(&upstream.url, "body.payload");
    config.transform.metrics_annotation_expression =
        "{team: body.team, source: query_params.source}".into();
    let (router, metrics) = common::app(config);

    common::post_json(router, "/", &json!({"team": "core", "payload": [1]})).await;

    assert_eq!(upstream.requests()[0].json(), json!([1]));
    assert_eq!(
        metrics.forwarded(),
        vec![vec![
            ("team".to_string(), "core".to_string()),
            ("source".to_string(), String::new()),
        ]]
    );
}

#[tokio::test]
async fn test_non_json_response_relayed_verbatim() {
    let upstream = common::start_upstream(200, "text/plain", "accepted").await;
    let (router, _) = common::app(config_for(&upstream.url, ""));

    let response = common::post_json(router, "/", &json!({"x": 1})).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), "text/plain");
    assert_eq!(response.text(), "accepted");
}

#[tokio::test]
async fn test_malformed_upstream_json_relayed_raw() {
    let upstream = common::start_upstream(200, "application/json", "{not json").await;
    let (router, metrics) = common::app(config_for(&upstream.url, ""));

    let response = common::post_json(router, "/", &json!({"x": 1})).await;

    assert_eq!(response.text(), "{not json");
    assert_eq!(metrics.forwarded().len(), 1);
}

#[tokio::test]
async fn test_invalid_global_expression_reports_without_forwarding() {
    let upstream = common::start_upstream(200, "application/json", "{}").await;
    let (router, metrics) = common::app(config_for(&upstream.url, "body.["));
    let body = json!({"user": {"name": "John"}});

    let response = common::post_json(router, "/?q=1", &body).await;

    let json = response.json();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Error in global expression: JMESPath parse error: "));
    assert_eq!(json["original_data"], body);
    assert_eq!(json["query_params"], json!({"q": "1"}));
    assert!(upstream.requests().is_empty());
    assert!(metrics.errors().is_empty());
}

#[tokio::test]
async fn test_execution_error_in_global_expression() {
    let (router, _) = common::app(config_for("", "length(body.n)"));

    let response = common::post_json(router, "/", &json!({"n": 3})).await;

    assert!(response.json()["error"]
        .as_str()
        .unwrap()
        .starts_with("Error in global expression: JMESPath execution error: "));
}
