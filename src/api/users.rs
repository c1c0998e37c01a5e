/// User account endpoints
///
/// Sessions travel in the `auth-token` cookie. State-changing routes that
/// act on a signed-in account also take `CsrfProtected`, which compares the
/// `X-CSRF-Token` header with the token handed out by `/csrf-token`.
use crate::{
    account::{
        ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, MessageResponse,
        NotificationRequest, RegisterRequest, RegisterResponse, ResetPasswordRequest,
        TokenRequest, UserPublicInfo,
    },
    api::{
        form::{AppJson, UploadForm},
        middleware::{expired_cookie, session_cookie, ClientAddr},
    },
    auth::{
        tokens::{CSRF_TTL_MS, USER_SESSION_TTL_SECS},
        CsrfProtected, UserSession, AUTH_COOKIE, CSRF_COOKIE,
    },
    context::AppContext,
    error::AppError,
    uploads::UserUploadReceipt,
};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/logout", post(logout))
        .route("/api/users/confirmByToken", post(confirm_by_token))
        .route("/api/users/send-confirmation", post(send_confirmation))
        .route("/api/users/forgot-password", post(forgot_password))
        .route("/api/users/reset-password", post(reset_password))
        .route("/api/users/change-password", post(change_password))
        .route("/api/users/user-upload", post(user_upload))
        .route("/api/users/set-notification", post(set_notification))
        .route("/api/users/csrf-token", get(csrf_token))
        .route("/api/users/user-info", get(user_info))
        .route("/api/users/verify-user", get(user_info))
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

async fn register(
    State(ctx): State<AppContext>,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    Ok(Json(ctx.accounts.register(request).await?))
}

async fn login(
    State(ctx): State<AppContext>,
    ClientAddr(ip): ClientAddr,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = ctx.accounts.login(&request, &ip).await?;

    let cookie = session_cookie(
        AUTH_COOKIE,
        &token,
        USER_SESSION_TTL_SECS,
        ctx.config.authentication.secure_cookies,
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse::new("Login successful")),
    ))
}

async fn logout(State(ctx): State<AppContext>) -> impl IntoResponse {
    let cookie = expired_cookie(AUTH_COOKIE, ctx.config.authentication.secure_cookies);
    (
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse::new("Logged out successfully")),
    )
}

async fn confirm_by_token(
    State(ctx): State<AppContext>,
    AppJson(request): AppJson<TokenRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    ctx.accounts.confirm_by_token(&request.token).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn send_confirmation(
    State(ctx): State<AppContext>,
    AppJson(request): AppJson<TokenRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    ctx.accounts.send_confirmation(&request.token).await?;
    Ok(Json(MessageResponse::new("Confirmation email sent")))
}

async fn forgot_password(
    State(ctx): State<AppContext>,
    AppJson(request): AppJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    ctx.accounts.forgot_password(&request.email).await?;
    Ok(Json(MessageResponse::new("Password reset email sent")))
}

async fn reset_password(
    State(ctx): State<AppContext>,
    AppJson(request): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    ctx.accounts.reset_password(request).await?;
    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}

async fn change_password(
    State(ctx): State<AppContext>,
    session: UserSession,
    _csrf: CsrfProtected,
    AppJson(request): AppJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    ctx.accounts.change_password(&session.id, &request).await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

async fn user_upload(
    State(ctx): State<AppContext>,
    session: UserSession,
    _csrf: CsrfProtected,
    form: UploadForm,
) -> Result<Json<UserUploadReceipt>, AppError> {
    let (first, second, file) = form.connection_parts()?;

    let receipt = ctx
        .uploads
        .user_upload(&session.id, first.trim(), second.trim(), &file)
        .await?;
    Ok(Json(receipt))
}

async fn set_notification(
    State(ctx): State<AppContext>,
    session: UserSession,
    AppJson(request): AppJson<NotificationRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    ctx.accounts
        .set_notification(&session.id, request.enabled)
        .await?;
    Ok(Json(MessageResponse::new(
        "Notification preference updated successfully",
    )))
}

async fn csrf_token(
    State(ctx): State<AppContext>,
    _session: UserSession,
) -> Result<impl IntoResponse, AppError> {
    let csrf = ctx.tokens.issue_csrf()?;

    let cookie = session_cookie(
        CSRF_COOKIE,
        &csrf.cookie_value,
        CSRF_TTL_MS / 1000,
        ctx.config.authentication.secure_cookies,
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(CsrfTokenResponse {
            csrf_token: csrf.token,
        }),
    ))
}

async fn user_info(
    State(ctx): State<AppContext>,
    session: UserSession,
) -> Result<Json<UserPublicInfo>, AppError> {
    Ok(Json(ctx.accounts.user_info(&session.id).await?))
}
