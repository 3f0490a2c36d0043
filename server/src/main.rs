use miette::{Context, IntoDiagnostic, Result};
use minibox_auth::AuthContext;

mod config;
mod gates;
mod pages;
mod routes;

#[derive(Clone)]
struct AppState {
    gates: gates::GateRegistry,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "minibox_server=debug,minibox_auth=debug,info".into()
            }),
        )
        .init();

    let config = config::ServerConfig::from_env()?;

    let context = AuthContext::new(config.auth)
        .into_diagnostic()
        .wrap_err("failed to set up authentication")?;

    let state = AppState {
        gates: gates::GateRegistry::new(context),
    };

    let app = routes::routes(state);

    tracing::info!("minibox listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .into_diagnostic()
        .wrap_err("failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .into_diagnostic()
        .wrap_err("server error")?;

    Ok(())
}
