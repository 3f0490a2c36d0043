use crate::error::{AuthError, Result};
use std::time::Duration;
use url::Url;

/// Configuration for the login flow against one identity provider
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL the `/authorize`, `/token` and `/userInfo` endpoints hang off
    pub auth_base: Url,

    /// Token issuer; the JWKS lives at `{issuer}/.well-known/jwks.json`
    pub issuer: Url,

    /// OAuth client id, also the expected ID token audience
    pub client_id: String,

    /// Where the provider sends the browser back to
    pub redirect_uri: Url,

    /// Space-separated scopes to request
    pub scope: String,

    /// Upper bound for every outbound HTTP call
    pub http_timeout: Duration,

    /// Cached JWKS older than this is re-fetched
    pub jwks_refresh_interval: Duration,

    /// Extra attempts for a failed JWKS fetch (never used for the token exchange)
    pub jwks_max_retries: u32,

    /// First retry delay, doubled per attempt
    pub jwks_retry_backoff: Duration,

    /// Clock skew tolerated on `exp`, in seconds
    pub leeway_seconds: u64,

    /// Require `iss` to equal `issuer`
    pub verify_issuer: bool,
}

impl AuthConfig {
    /// Create a new configuration with sensible defaults
    pub fn new(
        auth_base: Url,
        issuer: Url,
        client_id: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            auth_base,
            issuer,
            client_id: client_id.into(),
            redirect_uri,
            scope: "openid".to_string(),
            http_timeout: Duration::from_secs(10),
            jwks_refresh_interval: Duration::from_secs(3600),
            jwks_max_retries: 2,
            jwks_retry_backoff: Duration::from_millis(250),
            leeway_seconds: 0,
            verify_issuer: false,
        }
    }

    /// Configuration for an Amazon Cognito user pool and its hosted UI domain
    pub fn cognito(
        domain: &str,
        region: &str,
        user_pool_id: &str,
        client_id: impl Into<String>,
        redirect_uri: Url,
    ) -> Result<Self> {
        let auth_base = parse_url(&format!(
            "https://{}.auth.{}.amazoncognito.com/oauth2",
            domain, region
        ))?;
        let issuer = parse_url(&format!(
            "https://cognito-idp.{}.amazonaws.com/{}",
            region, user_pool_id
        ))?;

        Ok(Self::new(auth_base, issuer, client_id, redirect_uri).with_issuer_check(true))
    }

    /// Set requested scopes
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set the HTTP timeout
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set how long fetched keys are trusted before a refresh
    pub fn with_jwks_refresh_interval(mut self, interval: Duration) -> Self {
        self.jwks_refresh_interval = interval;
        self
    }

    /// Set the JWKS retry policy
    pub fn with_jwks_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.jwks_max_retries = max_retries;
        self.jwks_retry_backoff = backoff;
        self
    }

    /// Set the clock skew leeway
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Enable or disable the `iss` check
    pub fn with_issuer_check(mut self, enabled: bool) -> Self {
        self.verify_issuer = enabled;
        self
    }

    pub fn authorize_endpoint(&self) -> Result<Url> {
        join(&self.auth_base, "authorize")
    }

    pub fn token_endpoint(&self) -> Result<Url> {
        join(&self.auth_base, "token")
    }

    pub fn userinfo_endpoint(&self) -> Result<Url> {
        join(&self.auth_base, "userInfo")
    }

    pub fn jwks_uri(&self) -> Result<Url> {
        join(&self.issuer, ".well-known/jwks.json")
    }

    /// The issuer as it appears in the `iss` claim (no trailing slash)
    pub fn issuer_str(&self) -> &str {
        self.issuer.as_str().trim_end_matches('/')
    }
}

fn parse_url(s: &str) -> Result<Url> {
    Url::parse(s).map_err(|e| AuthError::InvalidConfig(format!("{}: {}", s, e)))
}

// `Url::join` drops the last path segment unless the base ends in '/'.
fn join(base: &Url, path: &str) -> Result<Url> {
    let base_str = base.as_str().trim_end_matches('/');
    parse_url(&format!("{}/{}", base_str, path))
}
