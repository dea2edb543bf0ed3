use std::sync::Arc;

use clap::Parser;
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use waterlog_api::clock::SystemClock;
use waterlog_api::config::Args;
use waterlog_api::server::start_server;
use waterlog_api::state::AppState;
use waterlog_api::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so clap sees it through its env fallbacks
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let settings = args.into_settings()?;

    info!(
        port = settings.port,
        origin = ?settings.allowed_origin,
        rate_limit = settings.rate_limit.max_requests,
        rate_window_secs = settings.rate_limit.window.as_secs(),
        api_keys = settings.api_keys.len(),
        "starting water-logging API"
    );

    let state = AppState::new(settings, Arc::new(MemoryStore::new()), Arc::new(SystemClock))?;
    for (method, pattern) in state.routes.routes() {
        debug!(%method, pattern, "route registered");
    }
    info!(routes = state.routes.len(), "route table built");

    start_server(Arc::new(state)).await?;
    Ok(())
}
