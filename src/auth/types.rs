//! OAuth2 token types
//!
//! `Token` is what stores persist and what the transport presents as a
//! bearer credential. `TokenResponse` is the token endpoint's wire format.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before their actual expiry
const EXPIRY_MARGIN_SECS: i64 = 10;

/// OAuth2 token for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer credential presented to the API
    pub access_token: String,

    /// Token type reported by the provider (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Long-lived credential used to obtain a new access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token stops being accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// Create a bearer token with no refresh token and no expiry
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// Set the refresh token
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set an absolute expiry
    #[must_use]
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Set the expiry relative to now
    #[must_use]
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_expiry(Utc::now() + Duration::seconds(seconds))
    }

    /// True once the access token is expired or about to expire.
    ///
    /// A token without an expiry never expires.
    pub fn is_expired(&self) -> bool {
        self.expiry
            .is_some_and(|expiry| Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= expiry)
    }

    /// True if the access token can be used as-is
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// True if a silent refresh can be attempted
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token; required
    pub access_token: String,
    /// Token type
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Refresh token, if the provider issued a new one
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Parse a token endpoint body, rejecting responses with no usable token
    pub fn from_body(body: &str) -> Result<Self> {
        let response: Self = serde_json::from_str(body)
            .map_err(|e| Error::decode(format!("Invalid token response: {e}")))?;

        if response.access_token.is_empty() {
            return Err(Error::decode("Token response contained an empty access_token"));
        }
        Ok(response)
    }

    /// Convert to a [`Token`], keeping `previous_refresh` when the provider
    /// did not rotate the refresh token
    pub fn into_token(self, previous_refresh: Option<String>) -> Token {
        let expiry = self
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Token {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(default_token_type),
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(previous_refresh),
            expiry,
        }
    }
}

/// Error body from the token endpoint (RFC 6749 section 5.2)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    /// Error code such as `invalid_grant`
    pub error: String,
    /// Human-readable explanation
    #[serde(default)]
    pub error_description: Option<String>,
}

impl std::fmt::Display for TokenErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => f.write_str(&self.error),
        }
    }
}

#[cfg(test)]
mod type_tests {
    use super::*;

    #[test]
    fn test_token_not_expired() {
        let token = Token::new("a").expires_in(3600);
        assert!(!token.is_expired());
        assert!(token.is_valid());
    }

    #[test]
    fn test_token_expired() {
        let token = Token::new("a").expires_in(-100);
        assert!(token.is_expired());
        assert!(!token.is_valid());
    }

    #[test]
    fn test_token_within_margin_counts_as_expired() {
        let token = Token::new("a").expires_in(5);
        assert!(token.is_expired());
    }

    #[test]
    fn test_token_no_expiration() {
        let token = Token::new("a");
        assert!(!token.is_expired());
        assert!(token.is_valid());
    }

    #[test]
    fn test_empty_access_token_is_invalid() {
        assert!(!Token::new("").is_valid());
    }

    #[test]
    fn test_can_refresh() {
        assert!(Token::new("a").with_refresh_token("r").can_refresh());
        assert!(!Token::new("a").with_refresh_token("").can_refresh());
        assert!(!Token::new("a").can_refresh());
    }

    #[test]
    fn test_token_serde_roundtrip_skips_empty_fields() {
        let json = serde_json::to_value(Token::new("a")).unwrap();
        assert_eq!(json, serde_json::json!({"access_token": "a", "token_type": "Bearer"}));

        let back: Token = serde_json::from_str(r#"{"access_token": "b"}"#).unwrap();
        assert_eq!(back.token_type, "Bearer");
    }

    #[test]
    fn test_response_keeps_previous_refresh_token() {
        let response =
            TokenResponse::from_body(r#"{"access_token": "new", "expires_in": 3600}"#).unwrap();
        let token = response.into_token(Some("old-refresh".into()));
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        assert!(token.expiry.is_some());
    }

    #[test]
    fn test_response_rotated_refresh_token_wins() {
        let response = TokenResponse::from_body(
            r#"{"access_token": "new", "refresh_token": "rotated", "token_type": "bearer"}"#,
        )
        .unwrap();
        let token = response.into_token(Some("old".into()));
        assert_eq!(token.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(token.token_type, "bearer");
        assert!(token.expiry.is_none());
    }

    #[test]
    fn test_response_without_access_token_is_rejected() {
        assert!(matches!(
            TokenResponse::from_body(r#"{"token_type": "Bearer"}"#),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            TokenResponse::from_body(r#"{"access_token": ""}"#),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_error_response_display() {
        let err: TokenErrorResponse = serde_json::from_str(
            r#"{"error": "invalid_grant", "error_description": "refresh token revoked"}"#,
        )
        .unwrap();
        assert_eq!(err.to_string(), "invalid_grant: refresh token revoked");
    }
}
