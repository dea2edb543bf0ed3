use std::sync::Arc;

use axum::http::header;
use axum::response::{IntoResponse, Response};

use super::RequestContext;
use crate::error::ApiError;
use crate::metrics::{RATE_LIMIT_CLIENTS, render};
use crate::state::AppState;

pub async fn metrics(state: Arc<AppState>, _ctx: RequestContext) -> Result<Response, ApiError> {
    RATE_LIMIT_CLIENTS.set(state.limiter.tracked_clients() as f64);
    let body = render().map_err(ApiError::Internal)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}
