use std::sync::Arc;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use super::{RequestContext, decode_all, encode, not_found, required};
use crate::error::ApiError;
use crate::models::{Incident, NewWard, Ward, WardUpdate};
use crate::state::AppState;
use crate::store::EntityKind;

pub async fn list(state: Arc<AppState>, _ctx: RequestContext) -> Result<Response, ApiError> {
    let wards = state.store.list(EntityKind::Ward)?;
    Ok(Json(wards).into_response())
}

pub async fn get(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let id = ctx.id_param("id")?;
    let ward = state
        .store
        .get(EntityKind::Ward, id)?
        .ok_or_else(|| not_found(EntityKind::Ward, id))?;
    Ok(Json(ward).into_response())
}

// incidents reported in one ward
pub async fn incidents(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let id = ctx.id_param("id")?;
    if state.store.get(EntityKind::Ward, id)?.is_none() {
        return Err(not_found(EntityKind::Ward, id));
    }

    let records = state.store.list(EntityKind::Incident)?;
    let incidents: Vec<Incident> = decode_all(records.clone())?;
    let in_ward: Vec<Value> = records
        .into_iter()
        .zip(incidents)
        .filter(|(_, incident)| incident.ward_id == id)
        .map(|(record, _)| record)
        .collect();

    Ok(Json(in_ward).into_response())
}

pub async fn create(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let new: NewWard = ctx.json()?;

    let now = Utc::now();
    let ward = Ward {
        id: 0,
        name: required("name", &new.name)?,
        zone: required("zone", &new.zone)?,
        population: new.population,
        flood_risk: new.flood_risk,
        created_at: now,
        updated_at: now,
    };

    let record = state.store.create(EntityKind::Ward, encode(&ward)?)?;
    info!(id = %record["id"], name = %ward.name, "ward created");

    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn update(state: Arc<AppState>, ctx: RequestContext) -> Result<Response, ApiError> {
    let id = ctx.id_param("id")?;
    let mut update: WardUpdate = ctx.json()?;

    if update.name.is_none()
        && update.zone.is_none()
        && update.population.is_none()
        && update.flood_risk.is_none()
    {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }
    update.name = update.name.as_deref().map(|n| required("name", n)).transpose()?;
    update.zone = update.zone.as_deref().map(|z| required("zone", z)).transpose()?;

    let mut patch = encode(&update)?;
    if let Value::Object(fields) = &mut patch {
        fields.insert("updated_at".to_string(), encode(&Utc::now())?);
    }

    let record = state
        .store
        .update(EntityKind::Ward, id, patch)?
        .ok_or_else(|| not_found(EntityKind::Ward, id))?;
    Ok(Json(record).into_response())
}
