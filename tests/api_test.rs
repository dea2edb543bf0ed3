use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

use waterlog_api::clock::ManualClock;
use waterlog_api::config::Settings;
use waterlog_api::middleware::ApiKeys;
use waterlog_api::rate_limit::RateLimitConfig;
use waterlog_api::server::build_router;
use waterlog_api::state::AppState;
use waterlog_api::store::{DataStore, EntityKind, MemoryStore, StoreError};

// keys the test server accepts as separate identities
const ISSUED_KEYS: [&str; 4] = ["tester", "A", "noisy", "quiet"];

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    clock: Arc<ManualClock>,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
    text: String,
}

fn app_with(max_requests: u32, window_secs: u64, store: Arc<dyn DataStore>) -> TestApp {
    let clock = Arc::new(ManualClock::new());
    let settings = Settings::with_rate_limit(RateLimitConfig {
        window: Duration::from_secs(window_secs),
        max_requests,
        idle_windows: 10,
    })
    .with_api_keys(ApiKeys::new(ISSUED_KEYS));
    let state = Arc::new(AppState::new(settings, store, clock.clone()).unwrap());
    TestApp {
        router: build_router(Arc::clone(&state)),
        state,
        clock,
    }
}

fn app() -> TestApp {
    app_with(1000, 60, Arc::new(MemoryStore::new()))
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, body: Option<Value>, api_key: &str) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-api-key", api_key);
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    async fn get(&self, uri: &str) -> TestResponse {
        self.call(Method::GET, uri, None, "tester").await
    }

    async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.call(Method::POST, uri, Some(body), "tester").await
    }

    async fn put(&self, uri: &str, body: Value) -> TestResponse {
        self.call(Method::PUT, uri, Some(body), "tester").await
    }

    async fn create_ward(&self, name: &str) -> u64 {
        let res = self
            .post(
                "/api/wards",
                json!({"name": name, "zone": "Central", "population": 120000, "flood_risk": "high"}),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
        res.body["id"].as_u64().unwrap()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let res = app.get("/health").await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], "OK");
    assert!(res.body["timestamp"].is_string());
    assert_eq!(res.body["subscribers"], 0);
}

#[tokio::test]
async fn index_lists_endpoint_groups() {
    let app = app();
    let res = app.get("/").await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["version"], "1.0.0");
    assert_eq!(res.body["endpoints"]["incidents"], "/api/incidents");
    assert_eq!(res.body["endpoints"]["wards"], "/api/wards");
    assert_eq!(res.body["endpoints"]["alerts"], "/api/alerts");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = app();

    let res = app.get("/api/floods").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["status"], 404);

    let res = app.call(Method::DELETE, "/api/incidents/1", None, "tester").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn incident_round_trip() {
    let app = app();

    let missing = app.get("/api/incidents/42").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let ward_id = app.create_ward("Karol Bagh").await;
    let created = app
        .post(
            "/api/incidents",
            json!({
                "ward_id": ward_id,
                "location": "Minto Bridge underpass",
                "latitude": 28.6328,
                "longitude": 77.2197,
                "severity": "critical",
                "water_level_cm": 90,
                "description": "Bus stranded"
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["status"], "reported");

    let id = created.body["id"].as_u64().unwrap();
    let fetched = app.get(&format!("/api/incidents/{id}")).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body, created.body);

    let list = app.get("/api/incidents").await;
    assert_eq!(list.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn incident_validation() {
    let app = app();
    let ward_id = app.create_ward("Rohini").await;

    let unknown_ward = app
        .post(
            "/api/incidents",
            json!({"ward_id": 99, "location": "Sector 7", "severity": "low"}),
        )
        .await;
    assert_eq!(unknown_ward.status, StatusCode::BAD_REQUEST);

    let blank = app
        .post(
            "/api/incidents",
            json!({"ward_id": ward_id, "location": "  ", "severity": "low"}),
        )
        .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let bad_severity = app
        .post(
            "/api/incidents",
            json!({"ward_id": ward_id, "location": "Sector 7", "severity": "apocalyptic"}),
        )
        .await;
    assert_eq!(bad_severity.status, StatusCode::BAD_REQUEST);

    let bad_id = app.get("/api/incidents/abc").await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);

    let no_body = app.call(Method::POST, "/api/incidents", None, "tester").await;
    assert_eq!(no_body.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_update_publishes_event() {
    let app = app();
    let ward_id = app.create_ward("Dwarka").await;
    let mut subscription = app.state.notifier.subscribe();

    let created = app
        .post(
            "/api/incidents",
            json!({"ward_id": ward_id, "location": "Sector 21 metro", "severity": "medium"}),
        )
        .await;
    let id = created.body["id"].as_u64().unwrap();

    let event = subscription.recv().await.unwrap();
    assert_eq!(event.event, "incident-created");
    assert_eq!(event.payload["id"], id);

    let updated = app
        .put(
            &format!("/api/incidents/{id}/status"),
            json!({"status": "in_progress"}),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["status"], "in_progress");
    assert_eq!(updated.body["location"], "Sector 21 metro");

    let event = subscription.recv().await.unwrap();
    assert_eq!(event.event, "incident-updated");
    assert_eq!(event.payload["status"], "in_progress");

    let missing = app
        .put("/api/incidents/77/status", json!({"status": "resolved"}))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_literal_route_beats_id_route() {
    let app = app();
    let ward_id = app.create_ward("Shahdara").await;

    for (severity, level) in [("high", 40), ("high", 60), ("low", 10)] {
        app.post(
            "/api/incidents",
            json!({"ward_id": ward_id, "location": "GT Road", "severity": severity, "water_level_cm": level}),
        )
        .await;
    }
    app.put("/api/incidents/3/status", json!({"status": "resolved"}))
        .await;

    let stats = app.get("/api/incidents/stats").await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["total"], 3);
    assert_eq!(stats.body["by_severity"]["high"], 2);
    assert_eq!(stats.body["by_status"]["reported"], 2);
    assert_eq!(stats.body["by_status"]["resolved"], 1);
    assert_eq!(stats.body["average_water_level_cm"], 110.0 / 3.0);
}

#[tokio::test]
async fn wards_crud_and_incidents_by_ward() {
    let app = app();
    let a = app.create_ward("Mayur Vihar").await;
    let b = app.create_ward("Saket").await;

    for ward_id in [a, a, b] {
        app.post(
            "/api/incidents",
            json!({"ward_id": ward_id, "location": "Main road", "severity": "medium"}),
        )
        .await;
    }

    let in_a = app.get(&format!("/api/wards/{a}/incidents")).await;
    assert_eq!(in_a.body.as_array().unwrap().len(), 2);
    let in_missing = app.get("/api/wards/50/incidents").await;
    assert_eq!(in_missing.status, StatusCode::NOT_FOUND);

    let updated = app
        .put(&format!("/api/wards/{b}"), json!({"flood_risk": "moderate"}))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["flood_risk"], "moderate");
    assert_eq!(updated.body["name"], "Saket");

    let empty = app.put(&format!("/api/wards/{b}"), json!({})).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let wards = app.get("/api/wards").await;
    assert_eq!(wards.body.as_array().unwrap().len(), 2);
    assert_eq!(app.get("/api/wards/9").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn alerts_lifecycle() {
    let app = app();
    let ward_id = app.create_ward("Yamuna Bazaar").await;
    let mut subscription = app.state.notifier.subscribe();

    let created = app
        .post(
            "/api/alerts",
            json!({
                "ward_id": ward_id,
                "level": "warning",
                "title": "Yamuna above danger mark",
                "message": "Move to higher ground"
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["active"], true);
    assert_eq!(subscription.recv().await.unwrap().event, "alert-created");

    app.post(
        "/api/alerts",
        json!({"ward_id": ward_id, "level": "watch", "title": "Rain", "message": "Heavy rain"}),
    )
    .await;
    subscription.recv().await.unwrap();

    let closed = app
        .put("/api/alerts/1/status", json!({"active": false}))
        .await;
    assert_eq!(closed.status, StatusCode::OK);
    assert_eq!(closed.body["active"], false);
    assert_eq!(subscription.recv().await.unwrap().event, "alert-updated");

    let active = app.get("/api/alerts/active").await;
    let active = active.body.as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], 2);

    assert_eq!(app.get("/api/alerts").await.body.as_array().unwrap().len(), 2);
    assert_eq!(app.get("/api/alerts/2").await.status, StatusCode::OK);
}

// 60s window, 5 requests: t=0..4 pass, t=5 gets 429 with 55s, t=61 passes
#[tokio::test]
async fn rate_limit_window_scenario() {
    let app = app_with(5, 60, Arc::new(MemoryStore::new()));

    for t in 0..5u32 {
        let res = app.call(Method::GET, "/health", None, "A").await;
        assert_eq!(res.status, StatusCode::OK, "request at t={t}");
        assert_eq!(res.headers["x-ratelimit-limit"], "5");
        assert_eq!(res.headers["x-ratelimit-remaining"], (4 - t).to_string().as_str());
        app.clock.advance(Duration::from_secs(1));
    }

    let denied = app.call(Method::GET, "/health", None, "A").await;
    assert_eq!(denied.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denied.headers[header::RETRY_AFTER], "55");
    assert_eq!(denied.body["retry_after_secs"], 55);

    app.clock.advance(Duration::from_secs(56));
    let later = app.call(Method::GET, "/health", None, "A").await;
    assert_eq!(later.status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_applies_to_every_route() {
    let app = app_with(1, 60, Arc::new(MemoryStore::new()));

    assert_eq!(app.get("/nope").await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/health").await.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.get("/ws").await.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn clients_are_isolated() {
    let app = app_with(2, 60, Arc::new(MemoryStore::new()));

    for _ in 0..2 {
        app.call(Method::GET, "/health", None, "noisy").await;
    }
    let noisy = app.call(Method::GET, "/health", None, "noisy").await;
    assert_eq!(noisy.status, StatusCode::TOO_MANY_REQUESTS);

    let quiet = app.call(Method::GET, "/health", None, "quiet").await;
    assert_eq!(quiet.status, StatusCode::OK);
    assert_eq!(quiet.headers["x-ratelimit-remaining"], "1");
}

#[tokio::test]
async fn rotating_unissued_keys_share_one_bucket() {
    let app = app_with(2, 60, Arc::new(MemoryStore::new()));

    let mut admitted = 0;
    for i in 0..50 {
        let res = app
            .call(Method::GET, "/health", None, &format!("made-up-{i}"))
            .await;
        if res.status == StatusCode::OK {
            admitted += 1;
        } else {
            assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(app.state.limiter.tracked_clients(), 1);

    // an issued key still gets its own quota
    let issued = app.call(Method::GET, "/health", None, "quiet").await;
    assert_eq!(issued.status, StatusCode::OK);
}

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Next text frame whose `event` is `name`, skipping anything else
async fn next_event(socket: &mut ClientSocket, name: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame within 5s")
            .expect("socket closed")
            .unwrap();
        if !msg.is_text() {
            continue;
        }
        let event: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        if event["event"] == name {
            return event;
        }
    }
}

#[tokio::test]
async fn websocket_connect_forward_and_disconnect() {
    let app = app();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = app
        .router
        .clone()
        .into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move { axum::serve(listener, service).await });

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let hello = next_event(&mut socket, "connect").await;
    assert!(hello["payload"]["subscriber_id"].is_u64());
    assert!(hello["timestamp"].is_string());
    assert_eq!(app.state.notifier.subscriber_count(), 1);

    let ward_id = app.create_ward("Chandni Chowk").await;
    let created = app
        .post(
            "/api/incidents",
            json!({"ward_id": ward_id, "location": "Old Delhi station", "severity": "high"}),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let event = next_event(&mut socket, "incident-created").await;
    assert_eq!(event["payload"]["id"], created.body["id"]);
    assert_eq!(event["payload"]["location"], "Old Delhi station");

    socket.close(None).await.unwrap();

    let mut remaining = app.state.notifier.subscriber_count();
    for _ in 0..100 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining = app.state.notifier.subscriber_count();
    }
    assert_eq!(remaining, 0);
}

struct FailingStore;

impl DataStore for FailingStore {
    fn list(&self, _kind: EntityKind) -> Result<Vec<Value>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn get(&self, _kind: EntityKind, _id: u64) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn create(&self, _kind: EntityKind, _payload: Value) -> Result<Value, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn update(&self, _kind: EntityKind, _id: u64, _patch: Value) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn store_failure_is_a_generic_server_error() {
    let app = app_with(3, 60, Arc::new(FailingStore));

    let res = app.get("/api/incidents").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body["error"], "Internal server error");
    assert!(!res.text.contains("connection refused"));

    // the failed request still counted once, nothing more
    let res = app.get("/api/wards/1").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers["x-ratelimit-remaining"], "1");

    // routing is unaffected
    assert_eq!(app.get("/health").await.status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_exposes_request_counters() {
    let app = app();
    app.get("/health").await;

    let res = app.get("/metrics").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.text.contains("waterlog_requests_total"));
    assert!(res.text.contains("waterlog_rate_limit_clients"));
}
