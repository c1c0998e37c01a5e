/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{AppError, AppResult},
    metrics,
    rate_limit::rate_limit_middleware,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method, StatusCode},
    middleware,
    response::Json,
    Router,
};
use serde_json::json;
use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Multipart framing on top of the largest accepted file
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    // Cookie sessions need credentialed CORS, which rules out a wildcard origin
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(crate::auth::CSRF_HEADER),
        ]);

    let body_limit = ctx.config.service.upload_limit + FORM_OVERHEAD_BYTES;

    Router::new()
        .merge(crate::api::routes())
        // Route layer so the matched path is visible to the metrics labels
        .route_layer(middleware::from_fn(metrics::track_http))
        // Before the layers so unknown routes are throttled and traced too
        .fallback(not_found)
        .with_state(ctx.clone())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Endpoint not found",
            "code": "NOT_FOUND"
        })),
    )
}

/// Background upkeep: uptime gauge and limiter pruning
fn spawn_housekeeping(ctx: &AppContext) {
    let limiter = ctx.rate_limiter.clone();
    let started = Instant::now();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            metrics::UPTIME_SECONDS.set(started.elapsed().as_secs_f64());
            limiter.prune();
        }
    });
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> AppResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Find Connections listening on {}", addr);
    info!("   Public URL: {}", ctx.config.service.public_url);
    info!(
        "   Rate limiting: {}",
        if ctx.rate_limiter.is_enabled() { "enabled" } else { "disabled" }
    );

    spawn_housekeeping(&ctx);
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
