use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::pkce::PkceContext;
use crate::random::constant_time_str_eq;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use url::Url;

/// Token endpoint response
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Redeems authorization codes at the token endpoint
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http: reqwest::Client,
    token_endpoint: Url,
    client_id: String,
    redirect_uri: String,
}

impl TokenExchangeClient {
    pub fn new(config: &AuthConfig, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            http,
            token_endpoint: config.token_endpoint()?,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.to_string(),
        })
    }

    /// Exchange `code` for tokens, provided `returned_state` matches the
    /// attempt that started this round-trip.
    ///
    /// A state mismatch fails before any request is made. The code is
    /// single-use, so a failed exchange is never retried. The returned set
    /// is unverified.
    pub async fn exchange(
        &self,
        code: &str,
        returned_state: &str,
        stored: &PkceContext,
    ) -> Result<TokenSet> {
        if !constant_time_str_eq(returned_state, &stored.state) {
            return Err(AuthError::StateMismatch);
        }

        tracing::info!(
            "exchanging authorization code for attempt {}",
            stored.state_hint()
        );

        let response = self
            .http
            .post(self.token_endpoint.clone())
            .header(CACHE_CONTROL, "no-store")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("code_verifier", stored.code_verifier.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(AuthError::exchange_transport)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(AuthError::exchange_transport)?;

        if !status.is_success() {
            return Err(AuthError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            body: format!("malformed token response: {}", e),
        })
    }
}
