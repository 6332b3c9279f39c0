//! Pluggable token persistence and permission handlers
//!
//! A [`TokenStore`] must be safe to call concurrently; the bundled stores
//! serialize access internally. [`TokenHandlers`] bundles the store and the
//! interactive permission provider supplied at client construction.

use super::types::Token;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Per-user token persistence
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the token cached for `user_id`, `None` if there is none
    async fn load(&self, user_id: &str) -> Result<Option<Token>>;

    /// Durably save `token` for `user_id`, replacing any previous one
    async fn save(&self, user_id: &str, token: &Token) -> Result<()>;
}

/// Obtains an authorization code for an authorization URL.
///
/// The returned string is either the bare code or the full redirect URL
/// (`...?code=...&state=...`); in the latter case the state is verified.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    /// Ask the user to grant access at `authorization_url`
    async fn request_permission(&self, authorization_url: &Url) -> Result<String>;
}

// ============================================================================
// Handler Bundle
// ============================================================================

/// Token lifecycle handlers, fixed for the lifetime of a client
#[derive(Clone, Default)]
pub struct TokenHandlers {
    /// Loads and saves tokens
    pub store: Option<Arc<dyn TokenStore>>,
    /// Provides authorization codes when no usable token exists
    pub permissions: Option<Arc<dyn PermissionHandler>>,
}

impl TokenHandlers {
    /// Create an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token store
    #[must_use]
    pub fn with_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set the permission handler
    #[must_use]
    pub fn with_permissions(mut self, handler: impl PermissionHandler + 'static) -> Self {
        self.permissions = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for TokenHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHandlers")
            .field("has_store", &self.store.is_some())
            .field("has_permissions", &self.permissions.is_some())
            .finish()
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Tokens kept in process memory
#[derive(Debug, Default, Clone)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<HashMap<String, Token>>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a cached token
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// True if no tokens are cached
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, user_id: &str) -> Result<Option<Token>> {
        Ok(self.tokens.read().await.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, token: &Token) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(user_id.to_string(), token.clone());
        Ok(())
    }
}

// ============================================================================
// File Store
// ============================================================================

/// One JSON file per user under a directory
#[derive(Debug)]
pub struct FileTokenStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileTokenStore {
    /// Store tokens under `dir`, created on first save
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the token file for a user.
    ///
    /// The file stem is the URL-safe base64 of the user id, so distinct ids
    /// never share a file and no id can escape the directory.
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        let name = URL_SAFE_NO_PAD.encode(user_id.as_bytes());
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, user_id: &str) -> Result<Option<Token>> {
        let path = self.path_for(user_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cached token");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::token_store(format!(
                    "Failed to read token file {}: {e}",
                    path.display()
                )))
            }
        };

        let token = serde_json::from_str(&contents).map_err(|e| {
            Error::token_store(format!(
                "Failed to parse token file {}: {e}",
                path.display()
            ))
        })?;
        Ok(Some(token))
    }

    async fn save(&self, user_id: &str, token: &Token) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::token_store(format!(
                "Failed to create token directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let path = self.path_for(user_id);
        let contents = serde_json::to_string_pretty(token)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::token_store(format!("Failed to write token file: {e}")))?;

        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::token_store(format!("Failed to rename token file: {e}")))?;

        Ok(())
    }
}

// ============================================================================
// Console Permission Handler
// ============================================================================

/// Prints the authorization URL and reads the code from stdin.
///
/// Blocks the acquisition until a line is entered. Never installed by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePermissionHandler;

#[async_trait]
impl PermissionHandler for ConsolePermissionHandler {
    async fn request_permission(&self, authorization_url: &Url) -> Result<String> {
        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(
                format!(
                    "Open this URL to grant access:\n\n  {authorization_url}\n\n\
                     Then paste the authorization code (or the full redirect URL): "
                )
                .as_bytes(),
            )
            .await?;
        stderr.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;

        let code = line.trim();
        if code.is_empty() {
            return Err(Error::oauth2("No authorization code entered"));
        }
        Ok(code.to_string())
    }
}
