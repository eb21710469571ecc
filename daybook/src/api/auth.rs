use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

use super::cookies::{self, CSRF_COOKIE, CSRF_HEADER, REFRESH_COOKIE};
use super::error::ApiError;
use super::middleware::ClientIp;
use super::server::AppState;
use crate::auth::{IssuedTokens, LoginRequest, Principal, RegisterRequest};
use crate::model::UserProfile;

fn session_response(state: &AppState, issued: &IssuedTokens) -> Response {
    let secure = state.app.config.auth.secure_cookies;
    let csrf = cookies::new_csrf_token();
    let mut response = Json(issued.response()).into_response();
    for cookie in cookies::session(&issued.refresh_token, &csrf, issued.refresh_ttl_seconds, secure) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.app.auth.register(request).await?))
}

pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let issued = state.app.auth.login(request, &ip).await?;
    Ok(session_response(&state, &issued))
}

/// Rotate the session. Needs the refresh cookie plus the CSRF cookie echoed
/// in `X-CSRF-TOKEN`.
pub async fn refresh(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let refresh_token =
        cookies::read(&headers, REFRESH_COOKIE).ok_or_else(|| ApiError::unauthorized("missing refresh token"))?;
    let csrf_cookie = cookies::read(&headers, CSRF_COOKIE);
    let csrf_header = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    match (csrf_cookie.as_deref(), csrf_header) {
        (Some(cookie), Some(header)) if cookie == header => {}
        _ => return Err(ApiError::unauthorized("CSRF token mismatch")),
    }

    let issued = state.app.auth.refresh(&refresh_token, &ip).await?;
    Ok(session_response(&state, &issued))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, ApiError> {
    state.app.auth.logout(principal.user_id).await?;
    let mut response = StatusCode::NO_CONTENT.into_response();
    for cookie in cookies::cleared(state.app.config.auth.secure_cookies) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.app.auth.me(principal.user_id).await?))
}
