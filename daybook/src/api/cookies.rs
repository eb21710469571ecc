//! Refresh and CSRF cookies.

use axum::http::{header, HeaderMap, HeaderValue};

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn build(name: &str, value: &str, max_age: i64, http_only: bool, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; Max-Age={}; SameSite=Strict", name, value, max_age);
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` values for a fresh session: the refresh token (HttpOnly)
/// and a script-readable CSRF token echoed back on refresh.
pub fn session(refresh_token: &str, csrf_token: &str, max_age: i64, secure: bool) -> Vec<HeaderValue> {
    [
        build(REFRESH_COOKIE, refresh_token, max_age, true, secure),
        build(CSRF_COOKIE, csrf_token, max_age, false, secure),
    ]
    .into_iter()
    .filter_map(|c| HeaderValue::from_str(&c).ok())
    .collect()
}

pub fn cleared(secure: bool) -> Vec<HeaderValue> {
    [
        build(REFRESH_COOKIE, "", 0, true, secure),
        build(CSRF_COOKIE, "", 0, false, secure),
    ]
    .into_iter()
    .filter_map(|c| HeaderValue::from_str(&c).ok())
    .collect()
}

pub fn new_csrf_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
