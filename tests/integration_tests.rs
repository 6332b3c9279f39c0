//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: YAML config → token acquisition → paginated
//! collection reads, with tokens persisted to a file store.

use async_trait::async_trait;
use chrono::Utc;
use itembase_sdk::auth::{FileTokenStore, PermissionHandler, TokenStore};
use itembase_sdk::pagination::{Anomaly, DocumentCollector};
use itembase_sdk::{Accumulator, Client, ClientConfig, DrainOutcome, Error, Token, TokenHandlers};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

/// Grants permission by answering with the redirect URL
#[derive(Default)]
struct AutoGrant {
    prompts: AtomicUsize,
}

#[async_trait]
impl PermissionHandler for AutoGrant {
    async fn request_permission(&self, authorization_url: &Url) -> itembase_sdk::Result<String> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let state = authorization_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        Ok(format!("https://app.example.com/callback?code=granted&state={state}"))
    }
}

/// Forwards to a shared handler so the test can inspect it afterwards
struct SharedGrant(Arc<AutoGrant>);

#[async_trait]
impl PermissionHandler for SharedGrant {
    async fn request_permission(&self, authorization_url: &Url) -> itembase_sdk::Result<String> {
        self.0.request_permission(authorization_url).await
    }
}

fn config_yaml(server: &MockServer) -> String {
    let base = server.uri();
    format!(
        r"
client_id: app-id
client_secret: app-secret
scopes:
  - user.minimal
  - connection.transaction
redirect_url: https://app.example.com/callback
endpoints:
  auth_url: {base}/oauth/v2/auth
  token_url: {base}/oauth/v2/token
  api_root: {base}/v1
  me_url: {base}/v1/me
http:
  max_retries: 2
  initial_backoff_ms: 1
  max_backoff_ms: 5
"
    )
}

fn build_client(server: &MockServer, dir: &TempDir, grant: &Arc<AutoGrant>) -> Client {
    let config = ClientConfig::from_yaml(&config_yaml(server)).unwrap();
    let handlers = TokenHandlers::new()
        .with_store(FileTokenStore::new(dir.path()))
        .with_permissions(SharedGrant(Arc::clone(grant)));
    Client::new(config, handlers).unwrap()
}

fn page(ids: &[&str], found: u64) -> serde_json::Value {
    json!({
        "documents": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>(),
        "num_documents_found": found,
        "num_documents_returned": ids.len(),
    })
}

async fn mount_token_grant(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=granted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "refresh_token": "refresh-1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// End-to-End Flows
// ============================================================================

#[tokio::test]
async fn test_authorize_persist_and_drain() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let grant = Arc::new(AutoGrant::default());

    mount_token_grant(&server, "access-1").await;

    Mock::given(method("GET"))
        .and(path("/v1/users/u1/transactions"))
        .and(header("Authorization", "Bearer access-1"))
        .and(query_param_is_missing("start_at_document"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["t1", "t2"], 5)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/u1/transactions"))
        .and(query_param("start_at_document", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["t3", "t4"], 5)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/u1/transactions"))
        .and(query_param("start_at_document", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["t5"], 5)))
        .mount(&server)
        .await;

    let client = build_client(&server, &dir, &grant);
    let user = client.user("u1").await.unwrap();

    let mut collected = DocumentCollector::new();
    let report = user
        .transactions()
        .get_all_into(&mut collected)
        .await
        .unwrap();

    assert_eq!(report.outcome, DrainOutcome::Complete);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(collected.count(), 5);
    assert_eq!(grant.prompts.load(Ordering::SeqCst), 1);

    let stored = FileTokenStore::new(dir.path()).load("u1").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-1");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));

    // A second client over the same directory reuses the persisted token
    let again = build_client(&server, &dir, &grant);
    again.user("u1").await.unwrap();
    assert_eq!(grant.prompts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let grant = Arc::new(AutoGrant::default());

    FileTokenStore::new(dir.path())
        .save(
            "u1",
            &Token::new("stale")
                .with_refresh_token("refresh-1")
                .with_expiry(Utc::now() - chrono::Duration::hours(1)),
        )
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "renewed",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/u1/products"))
        .and(header("Authorization", "Bearer renewed"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["p1"], 12)))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_client(&server, &dir, &grant);
    let found = client.user("u1").await.unwrap().products().found().await.unwrap();

    assert_eq!(found, 12);
    assert_eq!(grant.prompts.load(Ordering::SeqCst), 0);

    let stored = FileTokenStore::new(dir.path()).load("u1").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "renewed");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
    assert!(stored.is_valid());
}

#[tokio::test]
async fn test_rejected_refresh_falls_back_to_authorization() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let grant = Arc::new(AutoGrant::default());

    FileTokenStore::new(dir.path())
        .save(
            "u1",
            &Token::new("stale")
                .with_refresh_token("revoked")
                .with_expiry(Utc::now() - chrono::Duration::minutes(5)),
        )
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_token_grant(&server, "access-2").await;

    let client = build_client(&server, &dir, &grant);
    client.user("u1").await.unwrap();

    assert_eq!(grant.prompts.load(Ordering::SeqCst), 1);
    let stored = FileTokenStore::new(dir.path()).load("u1").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-2");
}

#[tokio::test]
async fn test_transient_errors_are_retried_mid_drain() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let grant = Arc::new(AutoGrant::default());
    mount_token_grant(&server, "access-1").await;

    Mock::given(method("GET"))
        .and(path("/v1/users/u1/buyers"))
        .and(query_param_is_missing("start_at_document"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["b1", "b2"], 4)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/u1/buyers"))
        .and(query_param("start_at_document", "2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/u1/buyers"))
        .and(query_param("start_at_document", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["b3", "b4"], 4)))
        .mount(&server)
        .await;

    let client = build_client(&server, &dir, &grant);
    let mut collected = DocumentCollector::new();
    let report = client
        .user("u1")
        .await
        .unwrap()
        .buyers()
        .get_all_into(&mut collected)
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(collected.count(), 4);
}

#[tokio::test]
async fn test_failed_page_keeps_earlier_documents() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let grant = Arc::new(AutoGrant::default());
    mount_token_grant(&server, "access-1").await;

    Mock::given(method("GET"))
        .and(path("/v1/users/u1/profiles"))
        .and(query_param_is_missing("start_at_document"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["p1", "p2"], 6)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/u1/profiles"))
        .and(query_param("start_at_document", "2"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "connection inactive", "code": 403 })),
        )
        .mount(&server)
        .await;

    let client = build_client(&server, &dir, &grant);
    let mut collected = DocumentCollector::new();
    let err = client
        .user("u1")
        .await
        .unwrap()
        .profiles()
        .get_all_into(&mut collected)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Api { code: 403, .. }));
    assert_eq!(collected.count(), 2);
}

#[tokio::test]
async fn test_single_document_page_stops_drain() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let grant = Arc::new(AutoGrant::default());
    mount_token_grant(&server, "access-1").await;

    Mock::given(method("GET"))
        .and(path("/v1/users/u1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["only"], 5)))
        .expect(1)
        .mount(&server)
        .await;

    let client = build_client(&server, &dir, &grant);
    let mut collected = DocumentCollector::new();
    let report = client
        .user("u1")
        .await
        .unwrap()
        .products()
        .get_all_into(&mut collected)
        .await
        .unwrap();

    assert_eq!(report.anomaly(), Some(Anomaly::SingleItemPage));
    assert_eq!(collected.count(), 1);
}

#[tokio::test]
async fn test_missing_permission_handler() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let config = ClientConfig::from_yaml(&config_yaml(&server)).unwrap();
    let handlers = TokenHandlers::new().with_store(FileTokenStore::new(dir.path()));
    let client = Client::new(config, handlers).unwrap();

    let err = client.user("u1").await.unwrap_err();
    assert!(matches!(err, Error::NoPermissionHandler));
    assert!(FileTokenStore::new(dir.path()).load("u1").await.unwrap().is_none());
}
