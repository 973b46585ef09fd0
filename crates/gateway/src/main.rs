use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scribe_config::GatewaySettings;
use scribe_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = GatewaySettings::load().context("loading settings")?;
    let endpoints = settings.backend_endpoints().context("resolving backends")?;
    info!(backends = ?endpoints.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(), "active backends");

    let addr = format!("{}:{}", settings.host, settings.port);
    let state = AppState::new(settings, endpoints);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "session gateway listening");
    axum::serve(listener, scribe_gateway::build_router(state)).await?;
    Ok(())
}
