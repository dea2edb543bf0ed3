use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use super::{RequestContext, decode_all, encode, not_found, require_ward, required};
use crate::error::ApiError;
use crate::models::{Alert, AlertStatusUpdate, NewAlert};
use crate::state::AppState;
use crate::store::EntityKind;

pub async fn list(state: Arc<AppState>, _ctx: RequestContext) -> Result<Response, ApiError> {
    let alerts = state.store.list(EntityKind::Alert)?;
    Ok(Json(alerts).into_response())
}

pub async fn active(state: Arc<AppState>, _ctx: RequestContext) -> Result<Response, ApiError> {
    let records = state.store.list(EntityKind::Alert)?;
    let alerts: Vec<Alert> = decode_all(records.clone())?;
    let active: Vec<Value> = records
        .into_iter()
        .zip(alerts)
        .filter(|(_, alert)| alert.active)
        .map(|(record, _)| record)
        .collect();
    Ok(Json(active).into_response())
}

pub async fn get(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let id = ctx.id_param("id")?;
    let alert = state
        .store
        .get(EntityKind::Alert, id)?
        .ok_or_else(|| not_found(EntityKind::Alert, id))?;
    Ok(Json(alert).into_response())
}

pub async fn create(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let new: NewAlert = ctx.json()?;
    let title = required("title", &new.title)?;
    let message = required("message", &new.message)?;
    require_ward(&state, new.ward_id)?;

    let now = Utc::now();
    let alert = Alert {
        id: 0,
        ward_id: new.ward_id,
        level: new.level,
        title,
        message,
        active: true,
        issued_at: now,
        updated_at: now,
    };

    let record = state.store.create(EntityKind::Alert, encode(&alert)?)?;
    info!(id = %record["id"], ward_id = new.ward_id, level = ?new.level, "alert issued");
    state.notifier.publish("alert-created", record.clone());

    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn update_status(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let id = ctx.id_param("id")?;
    let update: AlertStatusUpdate = ctx.json()?;

    let patch = json!({
        "active": update.active,
        "updated_at": Utc::now(),
    });
    let record = state
        .store
        .update(EntityKind::Alert, id, patch)?
        .ok_or_else(|| not_found(EntityKind::Alert, id))?;

    info!(id, active = update.active, "alert status changed");
    state.notifier.publish("alert-updated", record.clone());

    Ok(Json(record).into_response())
}
