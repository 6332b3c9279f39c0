//! Client configuration
//!
//! OAuth2 application credentials, the target environment and transport
//! settings. Loaded from YAML or JSON files, or built in code.

use crate::error::{Error, Result, ResultExt};
use crate::http::RateLimiterConfig;
use crate::types::{BackoffType, Environment, OptionStringExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-Level Client Config
// ============================================================================

/// Configuration for an itembase [`Client`](crate::client::Client)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// OAuth2 application ID of the registered itembase app
    pub client_id: String,

    /// OAuth2 application secret
    #[serde(default)]
    pub client_secret: String,

    /// Requested OAuth2 scopes
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Where users are sent after granting permission
    #[serde(default)]
    pub redirect_url: Option<String>,

    /// Production or sandbox hosts
    #[serde(default)]
    pub environment: Environment,

    /// Explicit endpoints, overriding the environment defaults
    #[serde(default)]
    pub endpoints: Option<Endpoints>,

    /// Transport settings
    #[serde(default)]
    pub http: HttpConfig,
}

impl ClientConfig {
    /// Create a config for the given application credentials
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Default::default()
        }
    }

    /// Switch to the production hosts
    #[must_use]
    pub fn production(mut self) -> Self {
        self.environment = Environment::Production;
        self
    }

    /// Switch to the sandbox hosts
    #[must_use]
    pub fn sandbox(mut self) -> Self {
        self.environment = Environment::Sandbox;
        self
    }

    /// Set the requested scopes
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the redirect URL
    #[must_use]
    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    /// Override all endpoints
    #[must_use]
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Replace transport settings
    #[must_use]
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Load a config file; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config '{}': {e}", path.display()))
        })?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config '{}'", path.display()))?
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid config '{}'", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::missing_field("client_id"));
        }
        if let Some(endpoints) = &self.endpoints {
            for (field, value) in [
                ("endpoints.auth_url", &endpoints.auth_url),
                ("endpoints.token_url", &endpoints.token_url),
                ("endpoints.api_root", &endpoints.api_root),
                ("endpoints.me_url", &endpoints.me_url),
            ] {
                url::Url::parse(value).map_err(|e| {
                    Error::config(format!("Invalid URL for '{field}': {e}"))
                })?;
            }
        }
        Ok(())
    }

    /// Endpoints in effect for this config
    pub fn resolved_endpoints(&self) -> Endpoints {
        self.endpoints
            .clone()
            .unwrap_or_else(|| Endpoints::for_environment(self.environment))
    }

    /// Redirect URL, treating an empty string as unset
    pub fn redirect(&self) -> Option<String> {
        self.redirect_url.clone().none_if_empty()
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Hosts the client talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// OAuth2 authorization endpoint
    pub auth_url: String,
    /// OAuth2 token endpoint
    pub token_url: String,
    /// Root of the document API (`{root}/users/{id}/...`)
    pub api_root: String,
    /// Endpoint describing the authorized user
    pub me_url: String,
}

impl Endpoints {
    /// Default endpoints for an environment
    pub fn for_environment(environment: Environment) -> Self {
        let (accounts, me, root) = match environment {
            Environment::Production => (
                "https://accounts.itembase.com/oauth/v2",
                "https://users.itembase.com/v1/me",
                "https://api.itembase.io/v1",
            ),
            Environment::Sandbox => (
                "http://sandbox.accounts.itembase.io/oauth/v2",
                "http://sandbox.users.itembase.io/v1/me",
                "http://sandbox.api.itembase.io/v1",
            ),
        };

        Self {
            auth_url: format!("{accounts}/auth"),
            token_url: format!("{accounts}/token"),
            api_root: root.to_string(),
            me_url: me.to_string(),
        }
    }

    /// Point every endpoint at one base URL (test servers, gateways)
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{base}/oauth/v2/auth"),
            token_url: format!("{base}/oauth/v2/token"),
            api_root: format!("{base}/v1"),
            me_url: format!("{base}/v1/me"),
        }
    }
}

// ============================================================================
// HTTP Config
// ============================================================================

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff strategy between retries
    #[serde(default)]
    pub backoff: BackoffType,

    /// First backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Optional client-side rate limit
    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,

    /// User agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_user_agent() -> String {
    format!("itembase-sdk/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_timeout_secs(),
            request_timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff: BackoffType::default(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            rate_limit: None,
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Connection timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// First backoff delay
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff cap
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Disable retries (each call is attempted once)
    #[must_use]
    pub fn without_retries(mut self) -> Self {
        self.max_retries = 0;
        self
    }
}
