use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    // Startup errors
    #[error("secure random source unavailable: {0}")]
    EntropySourceUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Callback errors
    #[error("state mismatch (possible CSRF)")]
    StateMismatch,

    #[error("authorization denied by identity provider: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    // Verification chain
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token expired")]
    TokenExpired,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("signing key not found for kid {0:?}")]
    SigningKeyNotFound(Option<String>),

    #[error("signature invalid")]
    SignatureInvalid,

    // Network errors
    #[error("JWKS unavailable: {0}")]
    JwksUnavailable(String),

    #[error("token exchange failed (status {status:?}): {body}")]
    TokenExchangeFailed { status: Option<u16>, body: String },

    #[error("http error: {0}")]
    Http(String),
}

impl AuthError {
    /// Stable label used in logs and deny pages.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::EntropySourceUnavailable(_) => "entropy_source_unavailable",
            AuthError::InvalidConfig(_) => "invalid_config",
            AuthError::StateMismatch => "state_mismatch",
            AuthError::AuthorizationDenied { .. } => "authorization_denied",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::SigningKeyNotFound(_) => "signing_key_not_found",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::JwksUnavailable(_) => "jwks_unavailable",
            AuthError::TokenExchangeFailed { .. } => "token_exchange_failed",
            AuthError::Http(_) => "http",
        }
    }

    /// True for failures of the ID token itself, as opposed to transport
    /// or flow failures.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken(_)
                | AuthError::TokenExpired
                | AuthError::AudienceMismatch
                | AuthError::IssuerMismatch
                | AuthError::SigningKeyNotFound(_)
                | AuthError::SignatureInvalid
        )
    }

    pub(crate) fn exchange_transport(e: reqwest::Error) -> Self {
        let body = if e.is_timeout() {
            "timeout".to_string()
        } else {
            e.to_string()
        };
        AuthError::TokenExchangeFailed {
            status: e.status().map(|s| s.as_u16()),
            body,
        }
    }
}

// axum IntoResponse implementation
#[cfg(feature = "axum")]
impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;

        let status = match self {
            AuthError::EntropySourceUnavailable(_) | AuthError::InvalidConfig(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AuthError::JwksUnavailable(_)
            | AuthError::TokenExchangeFailed { .. }
            | AuthError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({
            "error": self.kind(),
            "error_description": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
