//! Random and digest primitives shared by the PKCE generator and the
//! callback check.

use crate::error::{AuthError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Lowercase hex of `len` bytes from the operating system's CSPRNG.
///
/// Fails with [`AuthError::EntropySourceUnavailable`] when the OS source
/// cannot be read. There is no fallback to a weaker generator.
pub fn random_hex(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::EntropySourceUnavailable(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// `base64url_no_pad(SHA-256(input))`
pub fn sha256_base64url(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Equality that does not short-circuit on the first differing byte.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq::constant_time_eq(a.as_bytes(), b.as_bytes())
}
