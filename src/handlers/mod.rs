mod alerts;
mod health;
mod incidents;
mod metrics;
mod wards;

use std::future::Future;
use std::sync::Arc;

use axum::body::{Bytes, to_bytes};
use axum::extract::{Request, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dispatch::{PathParams, RouteTable};
use crate::error::{ApiError, ConfigError};
use crate::rate_limit::ClientKey;
use crate::state::AppState;
use crate::store::{EntityKind, StoreError};

// Largest request body we read into memory
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub type HandlerFuture = BoxFuture<'static, Result<Response, ApiError>>;

// Type-erased route handler stored in the route table
pub type Handler = Arc<dyn Fn(Arc<AppState>, RequestContext) -> HandlerFuture + Send + Sync>;

/// Per-request data handed to a handler. Built after routing, dropped
/// once the response is produced.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub params: PathParams,
    pub body: Bytes,
    pub client_key: ClientKey,
}

impl RequestContext {
    // Numeric path parameter, 400 if it isn't one
    pub fn id_param(&self, name: &str) -> Result<u64, ApiError> {
        let raw = self
            .params
            .get(name)
            .ok_or_else(|| ApiError::BadRequest(format!("missing path parameter {name}")))?;
        raw.parse()
            .map_err(|_| ApiError::BadRequest(format!("{name} must be a positive integer, got {raw:?}")))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if self.body.is_empty() {
            return Err(ApiError::BadRequest("request body is required".to_string()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
    }
}

fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<AppState>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, ApiError>> + Send + 'static,
{
    Arc::new(move |state, ctx| f(state, ctx).boxed())
}

/// Every REST route the service answers. Built once before the listener
/// binds; any collision aborts startup.
pub fn route_table() -> Result<RouteTable<Handler>, ConfigError> {
    let mut table = RouteTable::new();

    table.register(Method::GET, "/", handler(health::index))?;
    table.register(Method::GET, "/health", handler(health::health))?;
    table.register(Method::GET, "/metrics", handler(metrics::metrics))?;

    table.register(Method::GET, "/api/wards", handler(wards::list))?;
    table.register(Method::POST, "/api/wards", handler(wards::create))?;
    table.register(Method::GET, "/api/wards/{id}", handler(wards::get))?;
    table.register(Method::PUT, "/api/wards/{id}", handler(wards::update))?;
    table.register(Method::GET, "/api/wards/{id}/incidents", handler(wards::incidents))?;

    table.register(Method::GET, "/api/incidents", handler(incidents::list))?;
    table.register(Method::POST, "/api/incidents", handler(incidents::create))?;
    table.register(Method::GET, "/api/incidents/stats", handler(incidents::stats))?;
    table.register(Method::GET, "/api/incidents/{id}", handler(incidents::get))?;
    table.register(Method::PUT, "/api/incidents/{id}/status", handler(incidents::update_status))?;

    table.register(Method::GET, "/api/alerts", handler(alerts::list))?;
    table.register(Method::POST, "/api/alerts", handler(alerts::create))?;
    table.register(Method::GET, "/api/alerts/active", handler(alerts::active))?;
    table.register(Method::GET, "/api/alerts/{id}", handler(alerts::get))?;
    table.register(Method::PUT, "/api/alerts/{id}/status", handler(alerts::update_status))?;

    Ok(table)
}

// Axum fallback: resolve through the route table and run the handler
pub async fn dispatch_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let (route_handler, params) = match state.routes.dispatch(&parts.method, &path) {
        Ok(matched) => (Arc::clone(matched.handler), matched.params),
        Err(e) => return e.into_response(),
    };

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return ApiError::BadRequest(format!("request body exceeds {MAX_BODY_BYTES} bytes"))
                .into_response();
        }
    };

    let client_key = parts
        .extensions
        .get::<ClientKey>()
        .cloned()
        .unwrap_or_else(|| ClientKey::new("ip:unknown"));

    let ctx = RequestContext {
        method: parts.method,
        path,
        params,
        body,
        client_key,
    };

    match route_handler(state, ctx).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| StoreError::from(e).into())
}

fn decode_all<T: DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>, ApiError> {
    values.into_iter().map(decode).collect()
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| StoreError::from(e).into())
}

fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn require_ward(state: &AppState, ward_id: u64) -> Result<(), ApiError> {
    match state.store.get(EntityKind::Ward, ward_id)? {
        Some(_) => Ok(()),
        None => Err(ApiError::BadRequest(format!("ward {ward_id} does not exist"))),
    }
}

fn not_found(kind: EntityKind, id: u64) -> ApiError {
    ApiError::NotFound(format!("{kind} {id} not found"))
}
