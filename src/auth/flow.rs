//! Authorization-code flow
//!
//! Builds the authorization URL, hands it to a [`PermissionHandler`] and
//! exchanges the resulting code at the token endpoint. Token endpoint calls
//! are made exactly once; there is no retry here.

use super::store::PermissionHandler;
use super::types::{Token, TokenErrorResponse, TokenResponse};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

/// Bytes of entropy in the `state` parameter
const STATE_BYTES: usize = 32;

/// OAuth2 authorization-code flow for one registered application
#[derive(Clone)]
pub struct AuthorizationFlow {
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    redirect_url: Option<String>,
    auth_url: Url,
    token_url: Url,
    http_client: Client,
}

impl AuthorizationFlow {
    /// Create a flow from client config, using `http_client` for token requests
    pub fn new(config: &ClientConfig, http_client: Client) -> Result<Self> {
        let endpoints = config.resolved_endpoints();
        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: config.scopes.clone(),
            redirect_url: config.redirect(),
            auth_url: Url::parse(&endpoints.auth_url)?,
            token_url: Url::parse(&endpoints.token_url)?,
            http_client,
        })
    }

    /// Generate an opaque, URL-safe anti-forgery state value
    pub fn generate_state() -> String {
        let mut bytes = [0u8; STATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Authorization URL requesting offline access, bound to `state`
    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.auth_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("access_type", "offline")
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code");

            if let Some(redirect) = &self.redirect_url {
                pairs.append_pair("redirect_uri", redirect);
            }

            if !self.scopes.is_empty() {
                pairs.append_pair("scope", &self.scopes.join(" "));
            }

            pairs.append_pair("state", state);
        }
        url
    }

    /// Run the interactive flow and return the new token.
    ///
    /// The token is not persisted here.
    pub async fn authorize(&self, handler: Option<&dyn PermissionHandler>) -> Result<Token> {
        let handler = handler.ok_or(Error::NoPermissionHandler)?;

        let state = Self::generate_state();
        let url = self.authorization_url(&state);
        info!("requesting user authorization");

        let response = handler.request_permission(&url).await?;
        let code = extract_code(&response, &state)?;

        self.exchange_code(&code).await
    }

    /// Exchange an authorization code for a token
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(redirect) = &self.redirect_url {
            form.push(("redirect_uri", redirect.as_str()));
        }

        let body = self
            .token_request(&form)
            .await
            .map_err(|e| match e {
                Error::Api {
                    code: status,
                    message,
                } => Error::oauth2(format!(
                    "Code exchange failed with status {status}: {message}"
                )),
                other => other,
            })?;

        let token = TokenResponse::from_body(&body)?.into_token(None);
        debug!(has_refresh = token.refresh_token.is_some(), "code exchanged");
        Ok(token)
    }

    /// Obtain a fresh access token with a refresh token.
    ///
    /// An endpoint rejection is reported as [`Error::TokenRefresh`]; transport
    /// failures keep their own variant.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let body = self.token_request(&form).await.map_err(|e| match e {
            Error::Api {
                code: status,
                message,
            } => Error::TokenRefresh {
                message: format!("Refresh request failed with status {status}: {message}"),
            },
            other => other,
        })?;

        Ok(TokenResponse::from_body(&body)?.into_token(Some(refresh_token.to_string())))
    }

    /// POST a form to the token endpoint and return the success body
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<String> {
        let response = self
            .http_client
            .post(self.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map_or_else(|_| body.clone(), |err| err.to_string());
            return Err(Error::api(status.as_u16(), message));
        }

        Ok(body)
    }
}

impl std::fmt::Debug for AuthorizationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationFlow")
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Pull the code out of a handler response.
///
/// An http(s) redirect URL must carry the expected state; anything else is a bare code.
fn extract_code(response: &str, expected_state: &str) -> Result<String> {
    let response = response.trim();

    let redirect = Url::parse(response)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"));
    let Some(url) = redirect else {
        if response.is_empty() {
            return Err(Error::oauth2("Permission handler returned an empty code"));
        }
        return Ok(response.to_string());
    };

    let mut code = None;
    let mut state = None;
    let mut provider_error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => provider_error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = provider_error {
        return Err(Error::oauth2(format!("Authorization denied: {error}")));
    }

    if state.as_deref() != Some(expected_state) {
        return Err(Error::StateMismatch);
    }

    code.filter(|c| !c.is_empty())
        .ok_or_else(|| Error::oauth2("Redirect URL carried no authorization code"))
}
