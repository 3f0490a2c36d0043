//! Structural decoding of compact JWTs. Nothing here checks a signature.

use crate::error::{AuthError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which dot-separated part of the token to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header = 0,
    Claims = 1,
}

/// JOSE header of a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

/// Claims of an OpenID Connect ID token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Audience (client ID)
    pub aud: String,
    /// Subject (user ID)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Everything else the provider put in the token (`email`, `token_use`, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl JwtClaims {
    /// A string-valued claim outside the registered set, e.g. `email`.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}

/// The three parts of a compact JWS, still encoded.
#[derive(Debug, Clone, Copy)]
pub struct RawJwt<'a> {
    pub header: &'a str,
    pub claims: &'a str,
    pub signature: &'a str,
}

impl<'a> RawJwt<'a> {
    /// Split on `.`; anything other than exactly three parts is malformed.
    pub fn split(token: &'a str) -> Result<Self> {
        let mut parts = token.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(claims), Some(signature), None) => Ok(Self {
                header,
                claims,
                signature,
            }),
            _ => Err(AuthError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            )),
        }
    }

    /// `header.claims`, the bytes the signature covers.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.claims)
    }

    fn segment(&self, index: Segment) -> &'a str {
        match index {
            Segment::Header => self.header,
            Segment::Claims => self.claims,
        }
    }
}

/// Decode one segment of `token` to JSON.
pub fn decode_segment(token: &str, index: Segment) -> Result<Value> {
    let raw = RawJwt::split(token)?;
    decode_part(raw.segment(index))
}

/// Decode the header into its typed form.
pub fn decode_header(token: &str) -> Result<JwtHeader> {
    typed(decode_segment(token, Segment::Header)?, "header")
}

/// Decode the claims into their typed form.
pub fn decode_claims(token: &str) -> Result<JwtClaims> {
    typed(decode_segment(token, Segment::Claims)?, "claims")
}

fn typed<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| AuthError::MalformedToken(format!("invalid {}: {}", what, e)))
}

fn decode_part(part: &str) -> Result<Value> {
    // Padding is optional in JWTs; tolerate it if present.
    let bytes = URL_SAFE_NO_PAD
        .decode(part.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("invalid base64url: {}", e)))?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("invalid utf-8: {}", e)))?;
    serde_json::from_str(text).map_err(|e| AuthError::MalformedToken(format!("invalid JSON: {}", e)))
}
