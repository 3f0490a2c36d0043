use crate::AppState;
use axum::{
    Json,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use maud::{DOCTYPE, Markup, html};
use minibox_auth::{AuthError, CallbackQuery, Decision, VerifiedTokenSet};

pub async fn handle_root(State(state): State<AppState>, headers: HeaderMap) -> Markup {
    let who = state
        .gates
        .existing(&headers)
        .and_then(|gate| gate.session().tokens())
        .map(|tokens| display_name(&tokens));

    layout(
        "minibox",
        html! {
            h1 { "minibox" }
            @if let Some(name) = who {
                p { "Signed in as " (name) "." }
                p {
                    a href="/accueil/" { "Open your buckets" }
                    " | "
                    a href="/logout" { "Sign out" }
                }
            } @else {
                p { a href="/accueil/" { "Sign in" } }
            }
        },
    )
}

/// Protected home page, also the OAuth redirect URI.
pub async fn handle_accueil(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let browser = match state.gates.for_request(&headers) {
        Ok(browser) => browser,
        Err(e) => return e.into_response(),
    };
    let query = CallbackQuery::from_query(query.as_deref().unwrap_or(""));

    let response = match browser.gate.check(&query).await {
        // Drop code and state from the address bar once they are spent.
        Decision::Allow if query.is_callback() => Redirect::to("/accueil/").into_response(),
        Decision::Allow => match browser.gate.session().tokens() {
            Some(tokens) => accueil_page(&tokens, browser.gate.session().profile().as_deref()),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        },
        Decision::Redirect(url) => Redirect::to(url.as_str()).into_response(),
        Decision::Deny(e) => deny_page(&e),
    };

    browser.set_cookie(response)
}

/// Verified claims and profile as JSON. Never redirects.
pub async fn handle_me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(tokens) = state
        .gates
        .existing(&headers)
        .and_then(|gate| gate.session().tokens().map(|t| (gate, t)))
    else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "unauthenticated" })),
        )
            .into_response();
    };
    let (gate, tokens) = tokens;

    if tokens.is_expired_at(chrono::Utc::now().timestamp()) {
        gate.session().clear();
        return AuthError::TokenExpired.into_response();
    }

    Json(serde_json::json!({
        "claims": tokens.claims(),
        "profile": gate.session().profile().as_deref(),
    }))
    .into_response()
}

pub async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(gate) = state.gates.remove(&headers) {
        if let Err(e) = gate.logout().await {
            tracing::warn!("logout failed: {}", e);
        }
    }
    Redirect::to("/").into_response()
}

fn layout(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
            }
            body { (body) }
        }
    }
}

fn accueil_page(tokens: &VerifiedTokenSet, profile: Option<&serde_json::Value>) -> Response {
    let profile = profile.and_then(|p| serde_json::to_string_pretty(p).ok());

    layout(
        "Accueil",
        html! {
            h1 { "Accueil" }
            p { "Welcome, " (display_name(tokens)) "." }
            h2 { "Profile" }
            pre { (profile.as_deref().unwrap_or("(loading)")) }
            p { a href="/logout" { "Sign out" } }
        },
    )
    .into_response()
}

fn deny_page(error: &AuthError) -> Response {
    // No automatic retry: a structurally bad token would loop forever.
    let page = layout(
        "Sign-in failed",
        html! {
            h1 { "Sign-in failed" }
            p { "Reason: " code { (error.kind()) } }
            p { a href="/accueil/" { "Try again" } }
        },
    );
    (StatusCode::UNAUTHORIZED, page).into_response()
}

fn display_name(tokens: &VerifiedTokenSet) -> String {
    let claims = tokens.claims();
    claims
        .get_str("email")
        .or_else(|| claims.get_str("cognito:username"))
        .unwrap_or(&claims.sub)
        .to_string()
}
