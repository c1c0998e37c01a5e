/// Authentication extractors and utilities
///
/// Handlers declare what they need by taking one of these extractors:
/// `UserSession` for user routes, `AdminSession` for admin routes and
/// `CsrfProtected` for state-changing user routes.
pub mod password;
pub mod tokens;

use crate::{context::AppContext, error::AppError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use tokens::{Role, SessionClaims};

pub const AUTH_COOKIE: &str = "auth-token";
pub const ADMIN_COOKIE: &str = "admin-token";
pub const CSRF_COOKIE: &str = "csrf-token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Read and verify the session cookie `cookie`, requiring `role`
fn session_from_cookie(
    parts: &Parts,
    state: &AppContext,
    cookie: &str,
    role: Role,
) -> Result<SessionClaims, AppError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar
        .get(cookie)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthenticated("Unauthorized: No token provided".to_string()))?;

    let claims = state.tokens.verify_session(&token)?;

    if claims.role != role {
        tracing::warn!(email = %claims.email, "Session presented with the wrong role");
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    Ok(claims)
}

/// Authenticated user, from the `auth-token` cookie
#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: String,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for UserSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let claims = session_from_cookie(parts, state, AUTH_COOKIE, Role::User)?;
        let id = claims
            .id
            .ok_or_else(|| AppError::InvalidToken("Invalid token".to_string()))?;

        Ok(UserSession {
            id,
            email: claims.email,
        })
    }
}

/// Authenticated admin, from the `admin-token` cookie
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let claims = session_from_cookie(parts, state, ADMIN_COOKIE, Role::Admin)?;
        Ok(AdminSession {
            email: claims.email,
        })
    }
}

/// Passes only when `X-CSRF-Token` matches the signed `csrf-token` cookie
#[derive(Debug, Clone, Copy)]
pub struct CsrfProtected;

#[async_trait]
impl FromRequestParts<AppContext> for CsrfProtected {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let jar = CookieJar::from_headers(&parts.headers);

        let valid = match jar.get(CSRF_COOKIE) {
            Some(cookie) if !header.is_empty() => state.tokens.verify_csrf(cookie.value(), header),
            _ => false,
        };

        if !valid {
            tracing::warn!("CSRF check failed");
            return Err(AppError::Forbidden("Invalid CSRF token".to_string()));
        }

        Ok(CsrfProtected)
    }
}
