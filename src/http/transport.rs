//! reqwest-backed transport with retry and rate limiting
//!
//! Handles:
//! - Bearer authentication and gzip negotiation
//! - Automatic retries with configurable backoff
//! - Decoding of `{ "message", "code" }` error bodies into [`Error::Api`]

use super::rate_limit::RateLimiter;
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::types::{BackoffType, JsonValue, Method, StringMap};
use async_trait::async_trait;
use reqwest::header::ACCEPT_ENCODING;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// One request/response cycle against the API.
///
/// Implementations own all retry behavior; callers treat each `call` as
/// at-most-once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a request and decode the JSON response body.
    ///
    /// An empty body decodes to `JsonValue::Null`. Statuses >= 400 yield
    /// [`Error::Api`].
    async fn call(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&JsonValue>,
        query: &StringMap,
    ) -> Result<JsonValue>;
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<u16>,
}

/// HTTP transport with retry and rate limiting
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HttpTransport {
    /// Create a transport from settings
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()?;

        Ok(Self::with_client(config, client))
    }

    /// Create a transport around an existing reqwest client
    pub fn with_client(config: HttpConfig, client: Client) -> Self {
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);
        Self {
            client,
            config,
            rate_limiter,
        }
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&JsonValue>,
        query: &StringMap,
    ) -> Result<Response> {
        let max_retries = self.config.max_retries;
        let timeout = self.config.request_timeout();
        let mut last_error = None;
        let mut attempt = 0;

        while attempt <= max_retries {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let mut req = self
                .client
                .request(method.into(), url)
                .header(ACCEPT_ENCODING, "gzip");

            if let Some(token) = bearer.filter(|t| !t.is_empty()) {
                req = req.bearer_auth(token);
            }

            if !query.is_empty() {
                req = req.query(query);
            }

            if let Some(body) = body {
                req = req.json(body);
            }

            debug!(method = ?method, url, attempt, "itembase request");

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = extract_retry_after(&response);
                        if attempt < max_retries {
                            warn!(
                                "Rate limited (429), attempt {}/{}, waiting {}s",
                                attempt + 1,
                                max_retries + 1,
                                retry_after
                            );
                            tokio::time::sleep(Duration::from_secs(retry_after)).await;
                            attempt += 1;
                            continue;
                        }
                        return Err(Error::RateLimited {
                            retry_after_seconds: retry_after,
                        });
                    }

                    if !(status.is_client_error() || status.is_server_error()) {
                        return Ok(response);
                    }

                    let error = Error::api(status.as_u16(), status.to_string());
                    if error.is_retryable() && attempt < max_retries {
                        let delay = self.calculate_backoff(attempt);
                        warn!(
                            "Request failed with {}, attempt {}/{}, retrying in {:?}",
                            status.as_u16(),
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        last_error = Some(error);
                        continue;
                    }

                    return Err(api_error(response).await);
                }
                Err(e) if e.is_timeout() => {
                    let timeout_ms = timeout.as_millis() as u64;
                    if attempt < max_retries {
                        let delay = self.calculate_backoff(attempt);
                        warn!(
                            "Request timeout, attempt {}/{}, retrying in {:?}",
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        last_error = Some(Error::Timeout { timeout_ms });
                        continue;
                    }
                    return Err(Error::Timeout { timeout_ms });
                }
                Err(e) if e.is_connect() && attempt < max_retries => {
                    let delay = self.calculate_backoff(attempt);
                    warn!(
                        "Connection error, attempt {}/{}, retrying in {:?}",
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    last_error = Some(Error::Http(e));
                }
                Err(e) => return Err(Error::Http(e)),
            }
        }

        Err(last_error.unwrap_or(Error::MaxRetriesExceeded { max_retries }))
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_backoff();
        let delay = match self.config.backoff {
            BackoffType::Constant => initial,
            BackoffType::Linear => initial * (attempt + 1),
            BackoffType::Exponential => initial * 2u32.saturating_pow(attempt),
        };

        std::cmp::min(delay, self.config.max_backoff())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&JsonValue>,
        query: &StringMap,
    ) -> Result<JsonValue> {
        let response = self.send(method, url, bearer, body, query).await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::decode(format!("Invalid JSON from {url}: {e}")))
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Turn an error response into [`Error::Api`], preferring the body's fields
async fn api_error(response: Response) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => Error::api(
            body.code.unwrap_or(status.as_u16()),
            body.message.unwrap_or_else(|| status.to_string()),
        ),
        Err(_) if !text.trim().is_empty() => Error::api(status.as_u16(), text),
        Err(_) => Error::api(status.as_u16(), status.to_string()),
    }
}

/// Extract retry-after header value
fn extract_retry_after(response: &Response) -> u64 {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(60)
}
