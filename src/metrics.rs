use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("waterlog_requests_total", "Total number of requests").unwrap();
    pub static ref REQUESTS_THROTTLED: Counter = register_counter!(
        "waterlog_requests_throttled_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "waterlog_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_CLIENTS: Gauge = register_gauge!(
        "waterlog_rate_limit_clients",
        "Client keys currently tracked by the rate limiter"
    )
    .unwrap();
    pub static ref WS_SUBSCRIBERS: Gauge =
        register_gauge!("waterlog_ws_subscribers", "Connected WebSocket subscribers").unwrap();
    pub static ref EVENTS_PUBLISHED: Counter = register_counter!(
        "waterlog_events_published_total",
        "Events published to subscribers"
    )
    .unwrap();
}

// Render the default registry in the Prometheus text format
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("encode metrics: {e}"))?;
    String::from_utf8(buffer).map_err(|e| format!("metrics are not utf-8: {e}"))
}
