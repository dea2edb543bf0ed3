use std::sync::Arc;

use axum::Json;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use super::RequestContext;
use crate::error::ApiError;
use crate::state::AppState;

// health handler
pub async fn health(state: Arc<AppState>, _ctx: RequestContext) -> Result<Response, ApiError> {
    let uptime = Utc::now() - state.started_at;
    Ok(Json(serde_json::json!({
        "status": "OK",
        "message": "Delhi Water-Logging API is running",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_secs": uptime.num_seconds(),
        "subscribers": state.notifier.subscriber_count(),
    }))
    .into_response())
}

// service descriptor
pub async fn index(_state: Arc<AppState>, _ctx: RequestContext) -> Result<Response, ApiError> {
    Ok(Json(serde_json::json!({
        "message": "Delhi Water-Logging Dashboard API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "wards": "/api/wards",
            "incidents": "/api/incidents",
            "alerts": "/api/alerts",
            "websocket": "/ws",
        }
    }))
    .into_response())
}
