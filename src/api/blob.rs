/// Serving of disk-stored images behind signed links
use crate::{context::AppContext, error::AppError, object_store::Bucket};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

/// Build blob routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/blob/:bucket/:key", get(get_blob))
}

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    pub token: Option<String>,
}

/// Stream an object when the link's token names exactly this bucket and key
async fn get_blob(
    State(ctx): State<AppContext>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<BlobQuery>,
) -> Result<impl IntoResponse, AppError> {
    let token = query.token.unwrap_or_default();
    if token.is_empty() || !ctx.tokens.verify_blob_token(&token, &bucket, &key) {
        tracing::warn!(bucket, key, "Rejected blob request with invalid link");
        return Err(AppError::InvalidToken("Invalid or expired link".to_string()));
    }

    let bucket: Bucket = bucket.parse()?;
    let (bytes, content_type) = ctx
        .objects
        .get_object(bucket, &key)
        .await?
        .ok_or_else(|| AppError::NotFound("Image".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=60".to_string()),
        ],
        bytes,
    ))
}
