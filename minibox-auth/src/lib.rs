//! # minibox-auth
//!
//! Browser-side OAuth 2.0 Authorization Code login with PKCE, for apps that
//! sit behind an OpenID Connect identity provider such as Amazon Cognito.
//!
//! The crate owns the whole round-trip: it generates the PKCE verifier and
//! `state`, sends the user agent to the provider's `/authorize` endpoint,
//! redeems the returned code at `/token`, and verifies the RS256 ID token
//! against the provider's published JWKS before anything is stored.
//!
//! ## Features
//!
//! - **PKCE S256**: fresh verifier and `state` per attempt from the OS random source
//! - **Strict ID token checks**: expiry, audience, optional issuer, pinned RS256 signature
//! - **Shared JWKS cache**: single-flight fetches, rotation-aware refresh, bounded retries
//! - **Observable session**: token set and profile published over a `watch` channel
//! - **Navigation gate**: one call answers allow, redirect, or deny
//!
//! ## Example
//!
//! ```rust,no_run
//! use minibox_auth::{AuthConfig, AuthContext, CallbackQuery, Decision};
//!
//! # async fn example() -> minibox_auth::Result<()> {
//! let config = AuthConfig::cognito(
//!     "minibox",
//!     "eu-west-1",
//!     "eu-west-1_AbCdEf123",
//!     "client-123",
//!     "http://localhost:4200/accueil/".parse().unwrap(),
//! )?;
//! let context = AuthContext::new(config)?;
//! let gate = context.gate();
//!
//! match gate.check(&CallbackQuery::from_query("code=XYZ&state=abc123")).await {
//!     Decision::Allow => println!("welcome"),
//!     Decision::Redirect(url) => println!("go to {}", url),
//!     Decision::Deny(e) => println!("denied: {}", e.kind()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod attempt;
pub mod authorize;
pub mod config;
pub mod error;
pub mod exchange;
pub mod gate;
pub mod jwks;
pub mod jwt;
pub mod pkce;
pub mod random;
pub mod session;
pub mod userinfo;
pub mod verifier;

#[cfg(test)]
mod testing;

pub use attempt::{LoginAttemptStore, MemoryAttemptStore};
pub use config::AuthConfig;
pub use error::{AuthError, Result};
pub use exchange::{TokenExchangeClient, TokenSet};
pub use gate::{AuthContext, AuthGate, AuthGateBuilder, AuthState, CallbackQuery, Decision};
pub use jwks::{JwksCache, SigningKeys};
pub use jwt::JwtClaims;
pub use pkce::PkceContext;
pub use session::{Session, SessionStore};
pub use userinfo::{ProfileSource, UserInfoClient, UserProfile};
pub use verifier::{TokenVerifier, VerifiedTokenSet};
