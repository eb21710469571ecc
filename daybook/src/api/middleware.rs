use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, Extensions, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;

use super::error::ApiError;
use super::server::AppState;
use crate::auth::Principal;
use crate::Error;

/// Routes that do not require authentication
const AUTH_WHITELIST: &[&str] = &[
    "/health",
    "/metrics",
    "/files/",
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/refresh",
];

/// Client address: first `X-Forwarded-For` hop, then the socket peer.
pub fn ip_of(headers: &HeaderMap, extensions: &Extensions) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn client_ip(request: &Request) -> String {
    ip_of(request.headers(), request.extensions())
}

/// Extractor for the caller's address, used as the rate limit key.
pub struct ClientIp(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(ip_of(&parts.headers, &parts.extensions)))
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path();

    if request.method() == Method::OPTIONS || AUTH_WHITELIST.iter().any(|w| path.starts_with(w)) {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    let principal = state.app.auth.authenticate(token.trim())?;

    if path.starts_with("/api/admin/") && !principal.is_admin() {
        return Err(Error::Forbidden("administrator role required".to_string()).into());
    }

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Log every mutating API call under the `daybook::audit` target.
pub async fn audit_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    if !path.starts_with("/api/") || matches!(method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(request).await;
    }

    let client_ip = client_ip(&request);
    let user = request.extensions().get::<Principal>().map(|p| p.email.clone());

    let start = Instant::now();
    let response = next.run(request).await;

    tracing::info!(
        target: "daybook::audit",
        user = ?user,
        action = %format!("{} {}", method, path),
        status_code = response.status().as_u16(),
        client_ip = %client_ip,
        duration_ms = start.elapsed().as_millis() as u64,
        "audit"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), "203.0.113.7");

        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_ip(&request), "127.0.0.1");

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request), "unknown");
    }
}
