use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AllowedOrigin;
use crate::handlers::dispatch_request;
use crate::middleware::admission;
use crate::state::AppState;
use crate::ws::ws_handler;

/// Build the application router.
///
/// The WebSocket upgrade is the only axum-native route; every REST path
/// falls through to the route table. Admission runs in front of both.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = match &state.settings.allowed_origin {
        AllowedOrigin::Any => CorsLayer::new().allow_origin(Any),
        AllowedOrigin::Exact(origin) => CorsLayer::new().allow_origin(origin.clone()),
    }
    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
    .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .fallback(dispatch_request)
        .layer(from_fn_with_state(Arc::clone(&state), admission))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(String),

    #[error("serve error: {0}")]
    Serve(String),
}

// Serve until Ctrl-C
pub async fn start_server(state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "server listening, websocket on /ws");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ServerError::Serve(e.to_string()))?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // no signal handler available, run until killed
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
