//! The navigation gate: decides whether a protected navigation may proceed,
//! starting a login or finishing one as needed.

use crate::attempt::{LoginAttemptStore, MemoryAttemptStore};
use crate::authorize::build_authorize_url;
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::exchange::TokenExchangeClient;
use crate::jwks::{JwksCache, SigningKeys};
use crate::pkce::PkceContext;
use crate::random;
use crate::session::SessionStore;
use crate::userinfo::{ProfileSource, UserInfoClient};
use crate::verifier::TokenVerifier;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use url::Url;

/// Query parameters the provider may send back to the redirect URI
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackQuery {
    /// Parse a raw query string (without the leading `?`).
    ///
    /// A query that does not parse, e.g. one repeating `state`, is treated as
    /// carrying no callback at all.
    pub fn from_query(query: &str) -> Self {
        serde_urlencoded::from_str(query).unwrap_or_else(|e| {
            tracing::debug!("ignoring unparseable callback query: {}", e);
            Self::default()
        })
    }

    pub fn with_code(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }

    /// The navigation is a return from the provider, successful or not.
    pub fn is_callback(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// Outcome of a gated navigation
#[derive(Debug)]
pub enum Decision {
    /// Proceed
    Allow,
    /// Send the browser to the provider; the navigation itself is abandoned
    Redirect(Url),
    /// Block the navigation and surface the reason
    Deny(AuthError),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Where the gate is in the login flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    PendingRedirect,
    Exchanging,
    Authenticated,
    /// Last callback failed, with the error kind
    Failed(&'static str),
}

/// Everything shared between gates: configuration, the HTTP client, and the
/// process-wide JWKS cache.
#[derive(Clone)]
pub struct AuthContext {
    config: Arc<AuthConfig>,
    jwks: Arc<JwksCache>,
    verifier: TokenVerifier,
    exchange: TokenExchangeClient,
    profiles: Arc<dyn ProfileSource>,
    authorize_endpoint: Url,
}

impl AuthContext {
    /// Build the shared clients for `config`.
    ///
    /// Fails with [`AuthError::EntropySourceUnavailable`] if the system
    /// random source cannot be read, so that a broken host is caught at
    /// startup rather than on the first login.
    pub fn new(config: AuthConfig) -> Result<Self> {
        random::random_hex(1)?;

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AuthError::InvalidConfig(format!("http client: {}", e)))?;

        let jwks = Arc::new(JwksCache::new(&config, http.clone())?);
        let verifier = TokenVerifier::from_config(&config, jwks.clone());
        let exchange = TokenExchangeClient::new(&config, http.clone())?;
        let profiles = Arc::new(UserInfoClient::new(&config, http)?);
        let authorize_endpoint = config.authorize_endpoint()?;

        tracing::info!(
            "auth context ready (client {}, jwks {})",
            config.client_id,
            jwks.jwks_uri()
        );

        Ok(Self {
            config: Arc::new(config),
            jwks,
            verifier,
            exchange,
            profiles,
            authorize_endpoint,
        })
    }

    /// Use another source for user profiles instead of `/userInfo`
    pub fn with_profile_source(mut self, profiles: Arc<dyn ProfileSource>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Verify against `keys` instead of the fetched JWKS
    pub fn with_signing_keys(mut self, keys: Arc<dyn SigningKeys>) -> Self {
        self.verifier = TokenVerifier::from_config(&self.config, keys);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn jwks(&self) -> &Arc<JwksCache> {
        &self.jwks
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// A gate with in-memory attempt and session stores.
    pub fn gate(&self) -> AuthGate {
        AuthGate::builder(self).build()
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Decides gated navigations for one user agent.
pub struct AuthGate {
    context: AuthContext,
    attempts: Arc<dyn LoginAttemptStore>,
    session: Arc<SessionStore>,
    state: RwLock<AuthState>,
}

impl AuthGate {
    pub fn builder(context: &AuthContext) -> AuthGateBuilder {
        AuthGateBuilder {
            context: context.clone(),
            attempts: None,
            session: None,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn state(&self) -> AuthState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: AuthState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Decide whether the navigation carrying `query` may proceed.
    ///
    /// A callback is always handled first, even when a session already
    /// exists. Otherwise a live session allows immediately; an expired one
    /// is dropped and a new login starts.
    pub async fn check(&self, query: &CallbackQuery) -> Decision {
        if query.is_callback() {
            let mut abandoned = AbandonedCallback { gate: self, armed: true };
            let outcome = self.complete_login(query).await;
            abandoned.armed = false;

            return match outcome {
                Ok(()) => {
                    self.set_state(AuthState::Authenticated);
                    tracing::info!("login completed");
                    Decision::Allow
                }
                Err(e) => {
                    self.set_state(AuthState::Failed(e.kind()));
                    tracing::warn!(kind = e.kind(), "login denied: {}", e);
                    Decision::Deny(e)
                }
            };
        }

        if let Some(tokens) = self.session.tokens() {
            if !tokens.is_expired_at(chrono::Utc::now().timestamp()) {
                self.set_state(AuthState::Authenticated);
                return Decision::Allow;
            }
            tracing::info!("session for {} expired, starting new login", tokens.claims().sub);
            self.session.clear();
        }

        match self.start_login().await {
            Ok(url) => {
                self.set_state(AuthState::PendingRedirect);
                Decision::Redirect(url)
            }
            Err(e) => {
                self.set_state(AuthState::Failed(e.kind()));
                tracing::warn!(kind = e.kind(), "cannot start login: {}", e);
                Decision::Deny(e)
            }
        }
    }

    /// Forget the session and any pending login.
    pub async fn logout(&self) -> Result<()> {
        self.session.clear();
        self.attempts.clear().await?;
        self.set_state(AuthState::Unauthenticated);
        tracing::info!("logged out");
        Ok(())
    }

    async fn start_login(&self) -> Result<Url> {
        let pkce = PkceContext::generate()?;
        let config = &self.context.config;
        let url = build_authorize_url(
            &self.context.authorize_endpoint,
            &pkce,
            &config.client_id,
            config.redirect_uri.as_str(),
            &config.scope,
        );
        tracing::info!("redirecting to identity provider (attempt {})", pkce.state_hint());
        self.attempts.save(pkce).await?;
        Ok(url)
    }

    async fn complete_login(&self, query: &CallbackQuery) -> Result<()> {
        // Consumed up front: whatever happens next, this state is spent.
        let stored = self.attempts.take().await?;

        if let Some(error) = &query.error {
            return Err(AuthError::AuthorizationDenied {
                error: error.clone(),
                description: query.error_description.clone(),
            });
        }

        let (Some(code), Some(returned_state), Some(stored)) =
            (query.code.as_deref(), query.state.as_deref(), stored.as_ref())
        else {
            return Err(AuthError::StateMismatch);
        };

        self.set_state(AuthState::Exchanging);
        tracing::info!("callback received for attempt {}", stored.state_hint());

        let tokens = self
            .context
            .exchange
            .exchange(code, returned_state, stored)
            .await?;
        let verified = self
            .context
            .verifier
            .verify_token_set(tokens, &self.context.config.client_id)
            .await?;

        tracing::info!("authenticated {}", verified.claims().sub);
        self.session.set_tokens(verified);
        Ok(())
    }
}

/// Settles the state when a `check` future is dropped mid-callback. The
/// attempt is already spent and nothing was committed, so the gate falls back
/// to whatever the session says.
struct AbandonedCallback<'a> {
    gate: &'a AuthGate,
    armed: bool,
}

impl Drop for AbandonedCallback<'_> {
    fn drop(&mut self) {
        if self.armed && self.gate.state() == AuthState::Exchanging {
            let state = if self.gate.session.current().is_authenticated() {
                AuthState::Authenticated
            } else {
                AuthState::Unauthenticated
            };
            tracing::debug!("callback abandoned, state reset to {:?}", state);
            self.gate.set_state(state);
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("state", &self.state())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuthGate`]
pub struct AuthGateBuilder {
    context: AuthContext,
    attempts: Option<Arc<dyn LoginAttemptStore>>,
    session: Option<Arc<SessionStore>>,
}

impl AuthGateBuilder {
    pub fn attempt_store(mut self, store: Arc<dyn LoginAttemptStore>) -> Self {
        self.attempts = Some(store);
        self
    }

    pub fn session_store(mut self, store: Arc<SessionStore>) -> Self {
        self.session = Some(store);
        self
    }

    pub fn build(self) -> AuthGate {
        let attempts = self
            .attempts
            .unwrap_or_else(|| Arc::new(MemoryAttemptStore::new()));
        let session = self
            .session
            .unwrap_or_else(|| Arc::new(SessionStore::new(self.context.profiles.clone())));

        AuthGate {
            context: self.context,
            attempts,
            session,
            state: RwLock::new(AuthState::Unauthenticated),
        }
    }
}
