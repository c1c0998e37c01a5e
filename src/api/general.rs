/// Public endpoints: connection lookup, name suggestions, anonymous uploads
use crate::{
    api::{form::UploadForm, middleware::ClientAddr},
    connections::ConnectionPath,
    context::AppContext,
    error::AppError,
    uploads::TempUploadReceipt,
};
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

const SUGGESTIONS_CACHE_CONTROL: &str = "public, max-age=60, stale-while-revalidate=30";

/// Build general routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/general/connections", get(find_connections))
        .route("/api/general/suggestions", get(suggestions))
        .route("/api/general/upload-temp", post(upload_temp))
}

#[derive(Debug, Deserialize)]
pub struct ConnectionsQuery {
    pub name1: Option<String>,
    pub name2: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

async fn find_connections(
    State(ctx): State<AppContext>,
    Query(params): Query<ConnectionsQuery>,
) -> Result<Json<Vec<ConnectionPath>>, AppError> {
    let name1 = params.name1.unwrap_or_default();
    let name2 = params.name2.unwrap_or_default();

    let paths = ctx
        .connections
        .find_connections(name1.trim(), name2.trim())
        .await?;
    Ok(Json(paths))
}

async fn suggestions(
    State(ctx): State<AppContext>,
    Query(params): Query<SuggestionsQuery>,
) -> impl IntoResponse {
    let query = params.query.unwrap_or_default();
    let suggestions = ctx.suggestions.suggest(&query).await;

    (
        [(header::CACHE_CONTROL, SUGGESTIONS_CACHE_CONTROL)],
        Json(SuggestionsResponse { suggestions }),
    )
}

async fn upload_temp(
    State(ctx): State<AppContext>,
    ClientAddr(ip): ClientAddr,
    form: UploadForm,
) -> Result<Json<TempUploadReceipt>, AppError> {
    let file = form.file.ok_or_else(|| AppError::missing(&["file"]))?;

    let receipt = ctx.uploads.upload_temp(&ip, &file).await?;
    Ok(Json(receipt))
}
