//! Fixtures shared by the unit tests.

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::jwks::SigningKeys;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use serde_json::{Value, json};
use std::collections::HashMap;
use url::Url;

pub const PRIMARY_KEY_PEM: &str = include_str!("../tests/fixtures/primary_key.pem");
pub const FOREIGN_KEY_PEM: &str = include_str!("../tests/fixtures/foreign_key.pem");
pub const JWKS: &str = include_str!("../tests/fixtures/jwks.json");
pub const JWKS_ROTATED: &str = include_str!("../tests/fixtures/jwks_rotated.json");

pub const CLIENT_ID: &str = "client-123";

/// Config pointing every endpoint at a mock server.
pub fn config(base: &str) -> AuthConfig {
    AuthConfig::new(
        Url::parse(&format!("{}/oauth2", base)).unwrap(),
        Url::parse(&format!("{}/issuer", base)).unwrap(),
        CLIENT_ID,
        Url::parse("http://localhost:4200/accueil/").unwrap(),
    )
    .with_jwks_retries(0, std::time::Duration::ZERO)
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn claims(aud: &str, exp: i64) -> Value {
    json!({
        "sub": "user-1",
        "iss": "https://issuer.example.com",
        "aud": aud,
        "exp": exp,
        "iat": exp - 3600,
        "token_use": "id",
        "email": "user@example.com",
    })
}

/// RS256-sign `claims` with a fixture key.
pub fn sign(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// Assemble a token from arbitrary parts without signing anything.
pub fn forge(header: &Value, claims: &Value, signature: &[u8]) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap()),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap()),
        URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Keys parsed from the JWKS fixture, without HTTP.
pub struct StaticKeys(pub HashMap<String, DecodingKey>);

impl StaticKeys {
    pub fn from_jwks(doc: &str) -> Self {
        let set: crate::jwks::JwkSet = serde_json::from_str(doc).unwrap();
        let keys = set
            .keys
            .into_iter()
            .filter(|k| k.kty == "RSA")
            .map(|k| {
                let key = DecodingKey::from_rsa_components(
                    k.n.as_deref().unwrap(),
                    k.e.as_deref().unwrap(),
                )
                .unwrap();
                (k.kid.unwrap(), key)
            })
            .collect();
        Self(keys)
    }
}

#[async_trait]
impl SigningKeys for StaticKeys {
    async fn key_for(&self, kid: &str) -> Result<DecodingKey> {
        self.0
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::SigningKeyNotFound(Some(kid.to_string())))
    }
}

/// A verified token set without going through the verifier.
pub fn verified(access_token: &str, exp: i64) -> crate::verifier::VerifiedTokenSet {
    let tokens = crate::exchange::TokenSet {
        access_token: access_token.to_string(),
        id_token: "unused".to_string(),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
    };
    let claims = serde_json::from_value(claims(CLIENT_ID, exp)).unwrap();
    crate::verifier::VerifiedTokenSet::for_tests(tokens, claims)
}
