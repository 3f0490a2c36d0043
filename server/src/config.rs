use miette::{IntoDiagnostic, Result, WrapErr, miette};
use minibox_auth::AuthConfig;
use std::net::SocketAddr;
use url::Url;

const DEFAULT_BIND: &str = "127.0.0.1:4200";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:4200/accueil/";

pub struct ServerConfig {
    pub bind: SocketAddr,
    pub auth: AuthConfig,
}

impl ServerConfig {
    /// Read settings from `MINIBOX_*` environment variables.
    ///
    /// `MINIBOX_AUTH_BASE` together with `MINIBOX_ISSUER` selects a generic
    /// provider; otherwise the Cognito variables are required.
    pub fn from_env() -> Result<Self> {
        let bind = var_or("MINIBOX_BIND", DEFAULT_BIND)
            .parse::<SocketAddr>()
            .into_diagnostic()
            .wrap_err("MINIBOX_BIND is not a socket address")?;

        let client_id = required("MINIBOX_CLIENT_ID")?;
        let redirect_uri = parse_url("MINIBOX_REDIRECT_URI", &var_or("MINIBOX_REDIRECT_URI", DEFAULT_REDIRECT_URI))?;

        let auth = match (std::env::var("MINIBOX_AUTH_BASE"), std::env::var("MINIBOX_ISSUER")) {
            (Ok(auth_base), Ok(issuer)) => AuthConfig::new(
                parse_url("MINIBOX_AUTH_BASE", &auth_base)?,
                parse_url("MINIBOX_ISSUER", &issuer)?,
                client_id,
                redirect_uri,
            )
            .with_issuer_check(true),
            _ => AuthConfig::cognito(
                &required("MINIBOX_COGNITO_DOMAIN")?,
                &required("MINIBOX_COGNITO_REGION")?,
                &required("MINIBOX_USER_POOL_ID")?,
                client_id,
                redirect_uri,
            )
            .into_diagnostic()?,
        };

        Ok(Self { bind, auth })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| miette!("{} must be set", name))
}

fn parse_url(name: &str, value: &str) -> Result<Url> {
    Url::parse(value)
        .into_diagnostic()
        .wrap_err_with(|| format!("{} is not a valid URL", name))
}
