//! PKCE (RFC 7636) context for one login attempt.

use crate::error::Result;
use crate::random::{random_hex, sha256_base64url};
use serde::{Deserialize, Serialize};

/// Random bytes behind each of `state` and `code_verifier` (256 bits).
const RANDOM_BYTES: usize = 32;

/// State, verifier and S256 challenge for a single authorization round-trip.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceContext {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkceContext {
    /// Generate a fresh context from the OS random source.
    ///
    /// Both `state` and `code_verifier` are 64 lowercase hex characters,
    /// which keeps the verifier inside the unreserved set and within the
    /// 43..=128 length RFC 7636 allows.
    pub fn generate() -> Result<Self> {
        let state = random_hex(RANDOM_BYTES)?;
        let code_verifier = random_hex(RANDOM_BYTES)?;
        let code_challenge = compute_code_challenge(&code_verifier);

        Ok(Self {
            state,
            code_verifier,
            code_challenge,
        })
    }

    /// Short prefix of the state, safe to put in logs.
    pub fn state_hint(&self) -> &str {
        let end = self
            .state
            .char_indices()
            .nth(8)
            .map_or(self.state.len(), |(i, _)| i);
        &self.state[..end]
    }
}

// Keep the verifier out of debug output.
impl std::fmt::Debug for PkceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceContext")
            .field("state", &self.state_hint())
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// `base64url_no_pad(SHA-256(verifier))`
pub fn compute_code_challenge(verifier: &str) -> String {
    sha256_base64url(verifier)
}

/// True if every character is in RFC 3986's unreserved set `[A-Za-z0-9-._~]`.
pub fn is_unreserved(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}
