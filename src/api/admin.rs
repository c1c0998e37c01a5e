/// Admin endpoints: sign-in and curation of the permanent graph
use crate::{
    account::MessageResponse,
    api::{
        form::{AppJson, UploadForm},
        middleware::{expired_cookie, session_cookie},
    },
    auth::{tokens::ADMIN_SESSION_TTL_SECS, AdminSession, ADMIN_COOKIE},
    context::AppContext,
    error::AppError,
};
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/admin-login", get(admin_login))
        .route("/api/admin/verify-session", get(verify_session))
        .route("/api/admin/logout", post(logout))
        .route("/api/admin/admin-upload", post(admin_upload))
        .route("/api/admin/delete-connection", post(delete_connection))
        .route("/api/admin/delete-node", post(delete_node))
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginQuery {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUploadResponse {
    pub message: String,
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteConnectionRequest {
    #[serde(rename = "firstPersonFullName", default)]
    pub first: String,
    #[serde(rename = "secondPersonFullName", default)]
    pub second: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteNodeRequest {
    #[serde(rename = "fullName", default)]
    pub full_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNodeResponse {
    pub message: String,
    pub deleted_images: usize,
}

async fn admin_login(
    State(ctx): State<AppContext>,
    Query(params): Query<AdminLoginQuery>,
) -> Result<impl IntoResponse, AppError> {
    let email = params.email.unwrap_or_default();
    let password = params.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::missing(&["email", "password"]));
    }

    let token = ctx.accounts.admin_login(&email, &password).await?;

    let cookie = session_cookie(
        ADMIN_COOKIE,
        &token,
        ADMIN_SESSION_TTL_SECS,
        ctx.config.authentication.secure_cookies,
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse::new("Login successful")),
    ))
}

async fn verify_session(session: AdminSession) -> Json<SessionResponse> {
    Json(SessionResponse {
        message: "Authenticated".to_string(),
        email: session.email,
    })
}

async fn logout(State(ctx): State<AppContext>) -> impl IntoResponse {
    let cookie = expired_cookie(ADMIN_COOKIE, ctx.config.authentication.secure_cookies);
    (
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse::new("Logged out successfully")),
    )
}

async fn admin_upload(
    State(ctx): State<AppContext>,
    session: AdminSession,
    form: UploadForm,
) -> Result<Json<AdminUploadResponse>, AppError> {
    let (first, second, file) = form.connection_parts()?;

    let image_url = ctx
        .connections
        .admin_upload(first.trim(), second.trim(), &file)
        .await?;

    tracing::info!(admin = %session.email, first, second, "Admin added connection");
    Ok(Json(AdminUploadResponse {
        message: "File uploaded successfully!".to_string(),
        image_url,
    }))
}

async fn delete_connection(
    State(ctx): State<AppContext>,
    session: AdminSession,
    AppJson(request): AppJson<DeleteConnectionRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    ctx.connections
        .delete_connection(request.first.trim(), request.second.trim())
        .await?;

    tracing::info!(admin = %session.email, first = %request.first, second = %request.second, "Admin deleted connection");
    Ok(Json(MessageResponse::new("Connection deleted successfully")))
}

async fn delete_node(
    State(ctx): State<AppContext>,
    session: AdminSession,
    AppJson(request): AppJson<DeleteNodeRequest>,
) -> Result<Json<DeleteNodeResponse>, AppError> {
    let name = request.full_name.trim();
    let deleted_images = ctx.connections.delete_person(name).await?;

    tracing::info!(admin = %session.email, name, deleted_images, "Admin deleted person");
    Ok(Json(DeleteNodeResponse {
        message: format!("{} and all their connections were deleted", name),
        deleted_images,
    }))
}
