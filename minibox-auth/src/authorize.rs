//! Builds the identity provider's `/authorize` redirect.

use crate::pkce::PkceContext;
use url::Url;

/// Append the authorization-code + PKCE parameters to `authorize_endpoint`.
///
/// Pure; navigation is left to the caller.
pub fn build_authorize_url(
    authorize_endpoint: &Url,
    pkce: &PkceContext,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
) -> Url {
    let mut url = authorize_endpoint.clone();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("state", &pkce.state)
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope)
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", &pkce.code_challenge);
    url
}
