//! Tests for the HTTP transport

use super::*;
use crate::config::HttpConfig;
use crate::error::Error;
use crate::types::{BackoffType, Method, StringMap};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> HttpConfig {
    HttpConfig {
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..HttpConfig::default()
    }
}

fn transport() -> HttpTransport {
    HttpTransport::new(fast_config()).unwrap()
}

#[test]
fn test_backoff_strategies() {
    let config = HttpConfig {
        initial_backoff_ms: 100,
        max_backoff_ms: 1_000,
        backoff: BackoffType::Exponential,
        ..HttpConfig::default()
    };
    let t = HttpTransport::new(config.clone()).unwrap();
    assert_eq!(t.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(t.calculate_backoff(2), Duration::from_millis(400));
    assert_eq!(t.calculate_backoff(10), Duration::from_millis(1_000));

    let t = HttpTransport::new(HttpConfig {
        backoff: BackoffType::Linear,
        ..config.clone()
    })
    .unwrap();
    assert_eq!(t.calculate_backoff(2), Duration::from_millis(300));

    let t = HttpTransport::new(HttpConfig {
        backoff: BackoffType::Constant,
        ..config
    })
    .unwrap();
    assert_eq!(t.calculate_backoff(7), Duration::from_millis(100));
}

#[test]
fn test_rate_limiter_from_config() {
    let config = HttpConfig {
        rate_limit: Some(RateLimiterConfig::new(10, 10)),
        ..HttpConfig::default()
    };
    assert!(HttpTransport::new(config).unwrap().has_rate_limiter());
    assert!(!transport().has_rate_limiter());
}

#[tokio::test]
async fn test_call_sends_bearer_gzip_and_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/u1/products"))
        .and(header("Authorization", "Bearer tok-1"))
        .and(header("Accept-Encoding", "gzip"))
        .and(query_param("document_limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{"id": "p1"}],
            "num_documents_found": 1,
            "num_documents_returned": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut query = StringMap::new();
    query.insert("document_limit".into(), "5".into());

    let value = transport()
        .call(
            Method::GET,
            &format!("{}/v1/users/u1/products", server.uri()),
            Some("tok-1"),
            None,
            &query,
        )
        .await
        .unwrap();

    assert_eq!(value["documents"][0]["id"], "p1");
}

#[tokio::test]
async fn test_call_posts_json_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/things"))
        .and(body_json(json!({"name": "x"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .mount(&server)
        .await;

    let value = transport()
        .call(
            Method::POST,
            &format!("{}/v1/things", server.uri()),
            None,
            Some(&json!({"name": "x"})),
            &StringMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(value["id"], 9);
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/activate"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let value = transport()
        .call(
            Method::GET,
            &format!("{}/v1/activate", server.uri()),
            Some("t"),
            None,
            &StringMap::new(),
        )
        .await
        .unwrap();

    assert!(value.is_null());
}

#[tokio::test]
async fn test_api_error_body_is_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/users/u1/buyers"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "scope missing",
            "code": 403
        })))
        .mount(&server)
        .await;

    let err = transport()
        .call(
            Method::GET,
            &format!("{}/v1/users/u1/buyers", server.uri()),
            Some("t"),
            None,
            &StringMap::new(),
        )
        .await
        .unwrap_err();

    match err {
        Error::Api { code, message } => {
            assert_eq!(code, 403);
            assert_eq!(message, "scope missing");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_api_error_without_body_uses_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = transport()
        .call(
            Method::GET,
            &format!("{}/missing", server.uri()),
            None,
            None,
            &StringMap::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Api { code: 404, .. }));
}

#[tokio::test]
async fn test_retry_on_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let value = transport()
        .call(
            Method::GET,
            &format!("{}/flaky", server.uri()),
            None,
            None,
            &StringMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(value["ok"], true);
}

#[tokio::test]
async fn test_no_retry_when_disabled() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let t = HttpTransport::new(fast_config().without_retries()).unwrap();
    let err = t
        .call(
            Method::GET,
            &format!("{}/down", server.uri()),
            None,
            None,
            &StringMap::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Api { code: 500, .. }));
}

#[tokio::test]
async fn test_invalid_json_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = transport()
        .call(
            Method::GET,
            &format!("{}/html", server.uri()),
            None,
            None,
            &StringMap::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decode { .. }));
}
