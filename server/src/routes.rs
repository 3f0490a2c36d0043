use crate::{AppState, pages};
use axum::routing::get;

/// Build the application router
pub fn routes(app_state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/", get(pages::handle_root))
        // Protected, and the OAuth redirect URI
        .route("/accueil/", get(pages::handle_accueil))
        .route("/me", get(pages::handle_me))
        .route("/logout", get(pages::handle_logout))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::GateRegistry;
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode, header};
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use minibox_auth::{AuthConfig, AuthContext};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRIMARY_KEY_PEM: &str =
        include_str!("../../minibox-auth/tests/fixtures/primary_key.pem");
    const JWKS: &str = include_str!("../../minibox-auth/tests/fixtures/jwks.json");
    const CLIENT_ID: &str = "client-123";

    fn config(server: &MockServer) -> AuthConfig {
        AuthConfig::new(
            Url::parse(&format!("{}/oauth2", server.uri())).unwrap(),
            Url::parse(&format!("{}/issuer", server.uri())).unwrap(),
            CLIENT_ID,
            Url::parse("http://localhost:4200/accueil/").unwrap(),
        )
        .with_http_timeout(Duration::from_secs(2))
        .with_jwks_retries(0, Duration::ZERO)
    }

    fn app_state(config: AuthConfig) -> AppState {
        AppState {
            gates: GateRegistry::new(AuthContext::new(config).unwrap()),
        }
    }

    fn id_token(exp: i64) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("primary-kid".to_string());
        let claims = json!({
            "sub": "user-1",
            "iss": "https://issuer.example.com",
            "aud": CLIENT_ID,
            "exp": exp,
            "iat": exp - 3600,
            "token_use": "id",
            "email": "user-1@example.com",
        });
        let key = EncodingKey::from_rsa_pem(PRIMARY_KEY_PEM.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, &claims, &key).unwrap()
    }

    /// Token, JWKS and userinfo endpoints for a provider that accepts any code.
    async fn mount_provider(server: &MockServer, exp: i64, expected_exchanges: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-token",
                "id_token": id_token(exp),
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_exchanges)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/issuer/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(JWKS, "application/json"))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/userInfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"sub": "user-1", "email": "user-1@example.com"})),
            )
            .mount(server)
            .await;
    }

    async fn get(state: &AppState, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        routes(state.clone())
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &Response<Body>) -> Option<&str> {
        response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap())
    }

    fn session_cookie(response: &Response<Body>) -> String {
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn body_text(response: Response<Body>) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    /// Start a login and return the cookie plus the state sent to the provider.
    async fn start_login(state: &AppState) -> (String, String) {
        let response = get(state, "/accueil/", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&response);
        let authorize = Url::parse(location(&response).unwrap()).unwrap();
        let params: HashMap<_, _> = authorize.query_pairs().into_owned().collect();
        (cookie, params["state"].clone())
    }

    async fn sign_in(state: &AppState) -> String {
        let (cookie, oauth_state) = start_login(state).await;
        let callback = format!("/accueil/?code=XYZ&state={}", oauth_state);
        let response = get(state, &callback, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), Some("/accueil/"));
        cookie
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[tokio::test]
    async fn unauthenticated_navigation_redirects_to_provider() {
        let server = MockServer::start().await;
        mount_provider(&server, now() + 3600, 0).await;
        let state = app_state(config(&server));

        let response = get(&state, "/accueil/", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_cookie(&response);

        let authorize = Url::parse(location(&response).unwrap()).unwrap();
        assert!(authorize.as_str().starts_with(&format!("{}/oauth2/authorize", server.uri())));
        let params: HashMap<_, _> = authorize.query_pairs().into_owned().collect();
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], CLIENT_ID);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["redirect_uri"], "http://localhost:4200/accueil/");
    }

    #[tokio::test]
    async fn successful_callback_lands_back_on_accueil() {
        let server = MockServer::start().await;
        mount_provider(&server, now() + 3600, 1).await;
        let state = app_state(config(&server));

        let cookie = sign_in(&state).await;

        let response = get(&state, "/accueil/", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("user-1@example.com"));

        let response = get(&state, "/me", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["claims"]["sub"], "user-1");
    }

    #[tokio::test]
    async fn denied_callback_is_401_without_redirect() {
        let server = MockServer::start().await;
        mount_provider(&server, now() + 3600, 0).await;
        let state = app_state(config(&server));
        let (cookie, _) = start_login(&state).await;

        let response = get(&state, "/accueil/?code=XYZ&state=wrong", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(location(&response), None);
        assert!(body_text(response).await.contains("state_mismatch"));

        let response = get(&state, "/accueil/?error=access_denied&state=x", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(location(&response), None);
        assert!(body_text(response).await.contains("authorization_denied"));
    }

    #[tokio::test]
    async fn me_without_session_is_401_json() {
        let server = MockServer::start().await;
        let state = app_state(config(&server));

        for cookie in [None, Some("session_id=unknown")] {
            let response = get(&state, "/me", cookie).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(location(&response), None);
            assert_eq!(body_json(response).await["error"], "unauthenticated");
        }
    }

    #[tokio::test]
    async fn me_clears_expired_session() {
        let server = MockServer::start().await;
        // Accepted at the callback thanks to the leeway, already past `exp` for the session.
        mount_provider(&server, now() - 60, 1).await;
        let state = app_state(config(&server).with_leeway(300));
        let cookie = sign_in(&state).await;

        let response = get(&state, "/me", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(location(&response), None);
        assert_eq!(body_json(response).await["error"], "token_expired");

        let response = get(&state, "/me", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "unauthenticated");
    }

    #[tokio::test]
    async fn signed_in_browser_outlives_idle_eviction() {
        let server = MockServer::start().await;
        mount_provider(&server, now() + 3600, 1).await;
        let mut state = app_state(config(&server));
        state.gates = state.gates.with_idle_timeout(Duration::ZERO);

        let cookie = sign_in(&state).await;
        let (stranger, _) = start_login(&state).await;
        get(&state, "/accueil/", None).await;

        assert_eq!(get(&state, "/me", Some(&cookie)).await.status(), StatusCode::OK);
        let response = get(&state, "/me", Some(&stranger)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_forgets_the_browser() {
        let server = MockServer::start().await;
        mount_provider(&server, now() + 3600, 1).await;
        let state = app_state(config(&server));
        let cookie = sign_in(&state).await;

        let response = get(&state, "/logout", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), Some("/"));

        let response = get(&state, "/me", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
