use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{RequestContext, decode_all, encode, not_found, require_ward, required};
use crate::error::ApiError;
use crate::models::{Incident, IncidentStats, IncidentStatus, IncidentStatusUpdate, NewIncident};
use crate::state::AppState;
use crate::store::EntityKind;

pub async fn list(state: Arc<AppState>, _ctx: RequestContext) -> Result<Response, ApiError> {
    let incidents = state.store.list(EntityKind::Incident)?;
    Ok(Json(incidents).into_response())
}

pub async fn stats(state: Arc<AppState>, _ctx: RequestContext) -> Result<Response, ApiError> {
    let incidents: Vec<Incident> = decode_all(state.store.list(EntityKind::Incident)?)?;
    Ok(Json(IncidentStats::from_incidents(&incidents)).into_response())
}

pub async fn get(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let id = ctx.id_param("id")?;
    let incident = state
        .store
        .get(EntityKind::Incident, id)?
        .ok_or_else(|| not_found(EntityKind::Incident, id))?;
    Ok(Json(incident).into_response())
}

pub async fn create(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let new: NewIncident = ctx.json()?;
    let location = required("location", &new.location)?;

    if new.latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
        return Err(ApiError::BadRequest("latitude must be within [-90, 90]".to_string()));
    }
    if new.longitude.is_some_and(|lon| !(-180.0..=180.0).contains(&lon)) {
        return Err(ApiError::BadRequest("longitude must be within [-180, 180]".to_string()));
    }
    require_ward(&state, new.ward_id)?;

    let now = Utc::now();
    let incident = Incident {
        id: 0,
        ward_id: new.ward_id,
        location,
        latitude: new.latitude,
        longitude: new.longitude,
        severity: new.severity,
        water_level_cm: new.water_level_cm,
        description: new.description,
        reported_by: new.reported_by,
        status: IncidentStatus::Reported,
        reported_at: now,
        updated_at: now,
    };

    let record = state.store.create(EntityKind::Incident, encode(&incident)?)?;
    info!(id = %record["id"], ward_id = new.ward_id, client = %ctx.client_key, "incident reported");
    state.notifier.publish("incident-created", record.clone());

    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn update_status(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let id = ctx.id_param("id")?;
    let update: IncidentStatusUpdate = ctx.json()?;

    let patch = json!({
        "status": update.status,
        "updated_at": Utc::now(),
    });
    let record = state
        .store
        .update(EntityKind::Incident, id, patch)?
        .ok_or_else(|| not_found(EntityKind::Incident, id))?;

    info!(id, status = update.status.as_str(), "incident status changed");
    state.notifier.publish("incident-updated", record.clone());

    Ok(Json(record).into_response())
}
