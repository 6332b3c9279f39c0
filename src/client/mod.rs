//! itembase API client
//!
//! [`Client`] owns the transport and token manager. [`Client::user`] resolves
//! a bearer token for one user and returns a [`UserScope`] from which
//! collection requests are built:
//!
//! ```rust,ignore
//! let client = Client::new(config, handlers)?;
//! let user = client.user("3f1c...").await?;
//! let mut products = DocumentCollector::new();
//! let report = user.products().limit(100).get_all_into(&mut products).await?;
//! ```

mod request;


pub use request::CollectionRequest;

use crate::auth::{AuthorizationFlow, Token, TokenHandlers, TokenManager};
use crate::config::{ClientConfig, Endpoints};
use crate::error::{Error, Result};
use crate::http::{HttpTransport, Transport};
use crate::types::{JsonValue, Method, StringMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Profile of the user an access token belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub uuid: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub name_format: String,
    pub locale: String,
    pub email: String,
    pub preferred_currency: String,
}

// ============================================================================
// Client
// ============================================================================

/// Entry point to the itembase API
pub struct Client {
    transport: Arc<dyn Transport>,
    tokens: TokenManager,
    endpoints: Endpoints,
}

impl Client {
    /// Create a client with the default HTTP transport
    pub fn new(config: ClientConfig, handlers: TokenHandlers) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.http.clone())?;
        let flow = AuthorizationFlow::new(&config, transport.inner().clone())?;

        Ok(Self {
            transport: Arc::new(transport),
            tokens: TokenManager::new(flow, handlers),
            endpoints: config.resolved_endpoints(),
        })
    }

    /// Create a client that sends API calls through `transport`.
    ///
    /// Token endpoint requests still go over HTTP with the configured timeouts.
    pub fn with_transport(
        config: ClientConfig,
        handlers: TokenHandlers,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.http.connect_timeout())
            .timeout(config.http.request_timeout())
            .user_agent(&config.http.user_agent)
            .build()?;
        let flow = AuthorizationFlow::new(&config, http_client)?;

        Ok(Self {
            transport,
            tokens: TokenManager::new(flow, handlers),
            endpoints: config.resolved_endpoints(),
        })
    }

    /// Endpoints in use
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Token lifecycle manager
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Obtain a valid token for `user_id` and scope requests to that user
    pub async fn user(&self, user_id: &str) -> Result<UserScope> {
        let token = self.tokens.get_valid_token(user_id).await?;
        debug!(user_id, "user scope ready");
        Ok(UserScope {
            transport: Arc::clone(&self.transport),
            user_id: user_id.to_string(),
            bearer: token.access_token,
            user_root: format!(
                "{}/users/{user_id}",
                self.endpoints.api_root.trim_end_matches('/')
            ),
            me_url: self.endpoints.me_url.clone(),
        })
    }

    /// Exchange an authorization code delivered out of band (e.g. to a
    /// redirect endpoint). The token is returned, not stored.
    pub async fn handle_oauth_code(&self, code: &str) -> Result<Token> {
        self.tokens.handle_oauth_code(code).await
    }

    /// Resolve the id of the user a token belongs to
    pub async fn user_id_for_token(&self, token: &Token) -> Result<String> {
        let user = fetch_me(&*self.transport, &self.endpoints.me_url, &token.access_token).await?;
        if user.uuid.is_empty() {
            return Err(Error::decode("User profile carried no uuid"));
        }
        Ok(user.uuid)
    }

    /// Persist a token for `user_id`
    pub async fn store_token(&self, user_id: &str, token: &Token) -> Result<()> {
        self.tokens.store_token(user_id, token).await?;
        info!(user_id, "token stored");
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoints", &self.endpoints)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// User Scope
// ============================================================================

/// Requests on behalf of one authorized user
#[derive(Clone)]
pub struct UserScope {
    transport: Arc<dyn Transport>,
    user_id: String,
    bearer: String,
    user_root: String,
    me_url: String,
}

impl UserScope {
    /// User this scope acts for
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Request for the user's root resource
    pub fn request(&self) -> CollectionRequest {
        CollectionRequest::new(
            Arc::clone(&self.transport),
            &self.user_root,
            Some(self.bearer.clone()),
        )
    }

    pub fn transactions(&self) -> CollectionRequest {
        self.child("transactions")
    }

    pub fn products(&self) -> CollectionRequest {
        self.child("products")
    }

    pub fn buyers(&self) -> CollectionRequest {
        self.child("buyers")
    }

    pub fn profiles(&self) -> CollectionRequest {
        self.child("profiles")
    }

    /// Request for any path below the user's root
    pub fn child(&self, path: &str) -> CollectionRequest {
        self.request().child(path)
    }

    /// Profile of the authorized user
    pub async fn me(&self) -> Result<User> {
        fetch_me(&*self.transport, &self.me_url, &self.bearer).await
    }

    /// Activate the user's connection
    pub async fn activate(&self) -> Result<JsonValue> {
        self.child("activate").get_value().await
    }
}

impl std::fmt::Debug for UserScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserScope")
            .field("user_id", &self.user_id)
            .field("user_root", &self.user_root)
            .finish_non_exhaustive()
    }
}

async fn fetch_me(transport: &dyn Transport, me_url: &str, bearer: &str) -> Result<User> {
    let body = transport
        .call(Method::GET, me_url, Some(bearer), None, &StringMap::new())
        .await?;
    Ok(serde_json::from_value(body)?)
}
