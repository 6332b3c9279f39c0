//! Token lifecycle manager
//!
//! Resolves a usable bearer token for a user: cached, refreshed, or freshly
//! authorized. Every token it creates or refreshes is saved before it is
//! returned.

use super::flow::AuthorizationFlow;
use super::store::{TokenHandlers, TokenStore};
use super::types::Token;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Obtains and maintains per-user OAuth2 tokens
pub struct TokenManager {
    flow: AuthorizationFlow,
    handlers: TokenHandlers,
    /// Serializes acquisitions per user so one user never sees two prompts
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenManager {
    /// Create a manager
    pub fn new(flow: AuthorizationFlow, handlers: TokenHandlers) -> Self {
        Self {
            flow,
            handlers,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The authorization flow used for interactive and refresh requests
    pub fn flow(&self) -> &AuthorizationFlow {
        &self.flow
    }

    /// The configured handlers
    pub fn handlers(&self) -> &TokenHandlers {
        &self.handlers
    }

    /// Return a usable token for `user_id`.
    ///
    /// 1. No cached token: run the authorization flow, save, return.
    /// 2. Cached and unexpired: return it.
    /// 3. Expired with a refresh token: refresh, save, return.
    /// 4. Refresh rejected, or nothing to refresh with: back to 1.
    pub async fn get_valid_token(&self, user_id: &str) -> Result<Token> {
        let store = self.store()?;

        let lock = self.user_lock(user_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.acquire(store, user_id).await
        };
        self.release_user_lock(user_id, lock).await;
        result
    }

    async fn acquire(&self, store: &Arc<dyn TokenStore>, user_id: &str) -> Result<Token> {
        let Some(cached) = store.load(user_id).await? else {
            info!(user_id, "no cached token, starting authorization");
            return self.authorize_and_save(store, user_id).await;
        };

        if cached.is_valid() {
            debug!(user_id, "using cached token");
            return Ok(cached);
        }

        if cached.can_refresh() {
            let refresh_token = cached.refresh_token.as_deref().unwrap_or_default();
            match self.flow.refresh(refresh_token).await {
                Ok(refreshed) => {
                    info!(user_id, "access token refreshed");
                    self.save(store, user_id, &refreshed).await?;
                    return Ok(refreshed);
                }
                Err(Error::TokenRefresh { message }) => {
                    warn!(user_id, %message, "refresh rejected, reauthorizing");
                }
                Err(e) => return Err(e),
            }
        } else {
            info!(user_id, "token expired without refresh token, reauthorizing");
        }

        self.authorize_and_save(store, user_id).await
    }

    /// Exchange a code obtained out of band and return the token (unsaved)
    pub async fn handle_oauth_code(&self, code: &str) -> Result<Token> {
        self.flow.exchange_code(code).await
    }

    /// Persist a token for `user_id`
    pub async fn store_token(&self, user_id: &str, token: &Token) -> Result<()> {
        let store = self.store()?;
        self.save(store, user_id, token).await
    }

    /// Load the cached token for `user_id` without validating it
    pub async fn cached_token(&self, user_id: &str) -> Result<Option<Token>> {
        self.store()?.load(user_id).await
    }

    fn store(&self) -> Result<&Arc<dyn TokenStore>> {
        self.handlers.store.as_ref().ok_or(Error::NoTokenStore)
    }

    async fn authorize_and_save(&self, store: &Arc<dyn TokenStore>, user_id: &str) -> Result<Token> {
        let token = self
            .flow
            .authorize(self.handlers.permissions.as_deref())
            .await?;
        self.save(store, user_id, &token).await?;
        Ok(token)
    }

    async fn save(&self, store: &Arc<dyn TokenStore>, user_id: &str, token: &Token) -> Result<()> {
        store.save(user_id, token).await.map_err(|e| match e {
            Error::TokenStore { .. } => e,
            other => Error::token_store(format!("Failed to save token for {user_id}: {other}")),
        })
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the per-user lock entry once no other acquisition holds it
    async fn release_user_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.user_locks.lock().await;
        drop(lock);
        if locks
            .get(user_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(user_id);
        }
    }

    #[cfg(test)]
    pub(crate) async fn tracked_users(&self) -> usize {
        self.user_locks.lock().await.len()
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("flow", &self.flow)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
