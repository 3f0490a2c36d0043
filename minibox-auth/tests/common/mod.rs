#![allow(dead_code)]

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use minibox_auth::{AuthConfig, PkceContext};
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PRIMARY_KEY_PEM: &str = include_str!("../fixtures/primary_key.pem");
pub const FOREIGN_KEY_PEM: &str = include_str!("../fixtures/foreign_key.pem");
pub const JWKS: &str = include_str!("../fixtures/jwks.json");

pub const CLIENT_ID: &str = "client-123";
pub const STORED_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

/// Route library logs to the test harness; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minibox_auth=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn config(server: &MockServer) -> AuthConfig {
    init_tracing();

    AuthConfig::new(
        Url::parse(&format!("{}/oauth2", server.uri())).unwrap(),
        Url::parse(&format!("{}/issuer", server.uri())).unwrap(),
        CLIENT_ID,
        Url::parse("http://localhost:4200/accueil/").unwrap(),
    )
    .with_http_timeout(Duration::from_secs(2))
    .with_jwks_retries(0, Duration::ZERO)
}

/// The attempt a previous navigation would have persisted.
pub fn stored_attempt(state: &str) -> PkceContext {
    PkceContext {
        state: state.to_string(),
        code_verifier: STORED_VERIFIER.to_string(),
        code_challenge: minibox_auth::pkce::compute_code_challenge(STORED_VERIFIER),
    }
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn id_token(pem: &str, kid: &str, sub: &str, exp: i64) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let claims = json!({
        "sub": sub,
        "iss": "https://issuer.example.com",
        "aud": CLIENT_ID,
        "exp": exp,
        "iat": exp - 3600,
        "token_use": "id",
        "email": format!("{}@example.com", sub),
    });
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, &claims, &key).unwrap()
}

pub fn token_response(id_token: &str) -> Value {
    json!({
        "access_token": "access-token",
        "id_token": id_token,
        "refresh_token": "refresh-token",
        "token_type": "Bearer",
        "expires_in": 3600
    })
}

pub async fn mount_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/issuer/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(JWKS, "application/json"))
        .mount(server)
        .await;
}

pub async fn mount_userinfo(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/userInfo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"sub": "user-1", "email": "user-1@example.com"})),
        )
        .mount(server)
        .await;
}
