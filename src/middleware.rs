use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{ApiError, retry_after_secs};
use crate::metrics::{RATE_LIMIT_CLIENTS, REQUEST_LATENCY, REQUEST_TOTAL, REQUESTS_THROTTLED};
use crate::rate_limit::{ClientKey, Decision};
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

fn digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

// Issued API keys, held as sha256 digests only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys(HashSet<String>);

impl ApiKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            keys.into_iter()
                .map(|k| k.as_ref().trim().to_string())
                .filter(|k| !k.is_empty())
                .map(|k| digest(&k))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // Some(digest) only for a key that was issued
    fn recognize(&self, key: &str) -> Option<String> {
        let digest = digest(key);
        self.0.contains(&digest).then_some(digest)
    }
}

// Issued API key if the caller sent one, else the peer address.
// Unknown keys are ignored so a caller can't mint fresh identities.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, api_keys: &ApiKeys) -> ClientKey {
    let issued = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .and_then(|k| api_keys.recognize(k));

    if let Some(digest) = issued {
        return ClientKey::new(format!("key:{digest}"));
    }

    match peer {
        Some(addr) => ClientKey::new(format!("ip:{}", addr.ip())),
        None => ClientKey::new("ip:unknown"),
    }
}

fn set_limit_headers(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
}

pub async fn admission(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer, &state.settings.api_keys);

    let decision = state.limiter.admit(&key);
    RATE_LIMIT_CLIENTS.set(state.limiter.tracked_clients() as f64);

    if !decision.allowed {
        REQUESTS_THROTTLED.inc();
        warn!(
            client = %key,
            method = %request.method(),
            path = %request.uri().path(),
            retry_after_secs = retry_after_secs(decision.retry_after),
            "rate limit exceeded"
        );
        let mut response = ApiError::RateLimited {
            retry_after: decision.retry_after,
        }
        .into_response();
        set_limit_headers(&mut response, &decision);
        return response;
    }

    request.extensions_mut().insert(key);

    let start_time = Instant::now();
    let mut response = next.run(request).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    set_limit_headers(&mut response, &decision);
    response
}
