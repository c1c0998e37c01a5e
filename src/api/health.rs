/// Health check endpoints for liveness and readiness probes
///
/// Readiness checks every backend a request may touch:
/// - SQLite pool
/// - Person graph
/// - Object store
///
/// Also serves the Prometheus scrape endpoint.
use crate::{context::AppContext, error::AppResult, metrics, object_store::Bucket};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,

    pub version: String,

    pub uptime_seconds: f64,

    pub checks: Vec<ComponentHealth>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,

    pub status: String,

    /// Response time in milliseconds
    pub response_time_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_result(name: &str, start: Instant, result: AppResult<()>) -> Self {
        let response_time_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => ComponentHealth {
                name: name.to_string(),
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
            },
            Err(e) => {
                tracing::warn!(component = name, error = %e, "Health check failed");
                ComponentHealth {
                    name: name.to_string(),
                    status: "unhealthy".to_string(),
                    response_time_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
        .route("/metrics", get(metrics_endpoint))
}

/// Liveness: responds whenever the process can serve requests
pub async fn health_basic(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": ctx.config.service.version
    }))
}

/// Readiness: 200 when every backend answers, 503 otherwise
pub async fn readiness_probe(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let checks = vec![
        check_database(&ctx).await,
        check_graph(&ctx).await,
        check_object_store(&ctx).await,
    ];

    let status = determine_overall_status(&checks);
    let code = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let health = HealthStatus {
        status,
        version: ctx.config.service.version.clone(),
        uptime_seconds: metrics::UPTIME_SECONDS.get(),
        checks,
    };

    (code, Json(health))
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = sqlx::query("SELECT 1")
        .fetch_one(&ctx.db)
        .await
        .map(|_| ())
        .map_err(Into::into);
    ComponentHealth::from_result("database", start, result)
}

async fn check_graph(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = ctx.graph.person_exists("").await.map(|_| ());
    ComponentHealth::from_result("graph", start, result)
}

async fn check_object_store(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = ctx
        .objects
        .object_exists(Bucket::Permanent, ".health")
        .await
        .map(|_| ());
    ComponentHealth::from_result("object_store", start, result)
}

fn determine_overall_status(checks: &[ComponentHealth]) -> String {
    if checks.iter().any(|c| c.status != "healthy") {
        "unhealthy".to_string()
    } else {
        "healthy".to_string()
    }
}
