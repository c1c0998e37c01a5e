/// Request helpers shared by the route handlers: client address and cookies
use crate::context::AppContext;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap},
};
use std::{convert::Infallible, net::SocketAddr};

/// Client address used to key bans, upload allowances and throttling
///
/// Forwarding headers are only honoured behind a trusted proxy; otherwise
/// any client could pick a fresh address per request. Without either, the
/// TCP peer address is used.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(forwarded) = forwarded_ip(headers) {
            return forwarded;
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .or_else(|| header("cf-connecting-ip"))
        .map(str::to_string)
}

/// TCP peer recorded by `into_make_service_with_connect_info`
pub fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Client address of the current request
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

#[async_trait]
impl FromRequestParts<AppContext> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientAddr(client_ip(
            &parts.headers,
            peer_addr(&parts.extensions),
            state.config.service.trust_proxy_headers,
        )))
    }
}

/// `Set-Cookie` value for an HttpOnly, same-site-strict cookie on `/`
pub fn session_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes `name`
pub fn expired_cookie(name: &str, secure: bool) -> String {
    session_cookie(name, "", 0, secure)
}
