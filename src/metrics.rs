/// Metrics and telemetry for Find Connections
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Login outcomes and bans
/// - Upload outcomes and malware scan verdicts
/// - Connection lookups

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, Gauge, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .unwrap();

    // ========== Account Metrics ==========

    /// Login attempts by outcome (success, bad_credentials, banned)
    pub static ref LOGINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "logins_total",
        "Total number of login attempts",
        &["kind", "outcome"]
    )
    .unwrap();

    /// Accounts registered
    pub static ref REGISTRATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "registrations_total",
        "Total number of account registrations",
        &["outcome"]
    )
    .unwrap();

    // ========== Upload Metrics ==========

    /// Uploads by source (anonymous, user, admin) and outcome
    pub static ref UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "uploads_total",
        "Total number of image uploads",
        &["source", "outcome"]
    )
    .unwrap();

    /// Malware scan verdicts
    pub static ref MALWARE_SCANS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "malware_scans_total",
        "Total number of malware scans by verdict",
        &["verdict"]
    )
    .unwrap();

    // ========== Graph Metrics ==========

    /// Connection lookups by result (found, none)
    pub static ref CONNECTION_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "connection_lookups_total",
        "Total number of shortest-path lookups",
        &["result"]
    )
    .unwrap();

    /// Graph mutations by operation
    pub static ref GRAPH_MUTATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "graph_mutations_total",
        "Total number of admin graph changes",
        &["operation"]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a login attempt; `kind` is `user` or `admin`
pub fn record_login(kind: &str, outcome: &str) {
    LOGINS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn record_registration(outcome: &str) {
    REGISTRATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_upload(source: &str, outcome: &str) {
    UPLOADS_TOTAL.with_label_values(&[source, outcome]).inc();
}

pub fn record_scan(verdict: &str) {
    MALWARE_SCANS_TOTAL.with_label_values(&[verdict]).inc();
}

pub fn record_connection_lookup(found: bool) {
    CONNECTION_LOOKUPS_TOTAL
        .with_label_values(&[if found { "found" } else { "none" }])
        .inc();
}

pub fn record_graph_mutation(operation: &str) {
    GRAPH_MUTATIONS_TOTAL.with_label_values(&[operation]).inc();
}

/// Middleware recording count and latency of every request
///
/// Labels use the matched route template so path parameters do not
/// explode label cardinality.
pub async fn track_http(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    HTTP_REQUESTS_ACTIVE.inc();
    let start = Instant::now();
    let response = next.run(request).await;
    HTTP_REQUESTS_ACTIVE.dec();

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/general/connections", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_domain_counters() {
        record_login("user", "success");
        record_registration("created");
        record_upload("anonymous", "accepted");
        record_scan("clean");
        record_connection_lookup(true);
        record_graph_mutation("create_connection");

        let metrics = render_metrics();
        for name in [
            "logins_total",
            "registrations_total",
            "uploads_total",
            "malware_scans_total",
            "connection_lookups_total",
            "graph_mutations_total",
        ] {
            assert!(metrics.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_login_counter_increments() {
        let before = LOGINS_TOTAL.with_label_values(&["admin", "banned"]).get();
        record_login("admin", "banned");
        assert_eq!(
            LOGINS_TOTAL.with_label_values(&["admin", "banned"]).get(),
            before + 1
        );
    }
}
