//! ID token verification against the provider's signing keys.

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::exchange::TokenSet;
use crate::jwks::SigningKeys;
use crate::jwt::{self, JwtClaims, RawJwt};
use jsonwebtoken::Algorithm;
use std::sync::Arc;

/// The only signature algorithm accepted, whatever the token's header says.
const PINNED_ALG: &str = "RS256";

/// Checks expiry, audience, optionally issuer, and the RS256 signature of
/// an ID token, in that order, stopping at the first failure.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<dyn SigningKeys>,
    expected_issuer: Option<String>,
    leeway_seconds: u64,
}

impl TokenVerifier {
    pub fn new(keys: Arc<dyn SigningKeys>) -> Self {
        Self {
            keys,
            expected_issuer: None,
            leeway_seconds: 0,
        }
    }

    /// Verifier with the issuer and leeway policy of `config`
    pub fn from_config(config: &AuthConfig, keys: Arc<dyn SigningKeys>) -> Self {
        let verifier = Self::new(keys).with_leeway(config.leeway_seconds);
        if config.verify_issuer {
            verifier.with_issuer(config.issuer_str())
        } else {
            verifier
        }
    }

    /// Require `iss` to equal `issuer`
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Tolerate clock skew on `exp`
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Verify `id_token` against the current time.
    pub async fn verify(&self, id_token: &str, expected_audience: &str) -> Result<JwtClaims> {
        self.verify_at(id_token, expected_audience, chrono::Utc::now().timestamp())
            .await
    }

    /// Verify `id_token` as of `now` (Unix seconds).
    pub async fn verify_at(
        &self,
        id_token: &str,
        expected_audience: &str,
        now: i64,
    ) -> Result<JwtClaims> {
        // 1. structure
        let raw = RawJwt::split(id_token)?;
        let header = jwt::decode_header(id_token)?;
        let claims = jwt::decode_claims(id_token)?;

        // 2. expiry; now == exp is already expired
        let leeway = i64::try_from(self.leeway_seconds).unwrap_or(i64::MAX);
        if now >= claims.exp.saturating_add(leeway) {
            return Err(AuthError::TokenExpired);
        }

        // 3. audience, exact and case-sensitive
        if claims.aud != expected_audience {
            return Err(AuthError::AudienceMismatch);
        }

        if let Some(issuer) = &self.expected_issuer {
            if claims.iss != *issuer {
                return Err(AuthError::IssuerMismatch);
            }
        }

        // 4. key lookup
        let kid = header
            .kid
            .as_deref()
            .ok_or(AuthError::SigningKeyNotFound(None))?;
        let key = self.keys.key_for(kid).await?;

        // 5. signature, RS256 only
        if header.alg != PINNED_ALG {
            tracing::warn!("rejecting token signed with alg {:?}", header.alg);
            return Err(AuthError::SignatureInvalid);
        }
        let valid = jsonwebtoken::crypto::verify(
            raw.signature,
            raw.signing_input().as_bytes(),
            &key,
            Algorithm::RS256,
        )
        .map_err(|_| AuthError::SignatureInvalid)?;
        if !valid {
            return Err(AuthError::SignatureInvalid);
        }

        Ok(claims)
    }

    /// Verify the ID token of a freshly exchanged token set.
    ///
    /// This is the only way to obtain a [`VerifiedTokenSet`], which is the
    /// only thing the session store accepts.
    pub async fn verify_token_set(
        &self,
        tokens: TokenSet,
        expected_audience: &str,
    ) -> Result<VerifiedTokenSet> {
        let claims = self.verify(&tokens.id_token, expected_audience).await?;
        Ok(VerifiedTokenSet { tokens, claims })
    }
}

/// A token set whose ID token passed the full verification chain
#[derive(Debug, Clone)]
pub struct VerifiedTokenSet {
    tokens: TokenSet,
    claims: JwtClaims,
}

impl VerifiedTokenSet {
    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn claims(&self) -> &JwtClaims {
        &self.claims
    }

    /// ID token expiry has passed (with no leeway).
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.claims.exp
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tokens: TokenSet, claims: JwtClaims) -> Self {
        Self { tokens, claims }
    }
}
