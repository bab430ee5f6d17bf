use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use ticketing_models::Session;

pub const SESSION_COOKIE: &str = "session_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

fn cookie(name: &str, value: &str, expires: DateTime<Utc>, max_age: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; Secure; SameSite=Strict; Expires={}; Max-Age={}",
        name,
        value,
        expires.format(EXPIRES_FORMAT),
        max_age.max(0)
    )
}

/// Set-Cookie values for a fresh session.
pub fn session_cookies(session: &Session) -> [(header::HeaderName, String); 2] {
    let now = Utc::now();
    [
        (
            header::SET_COOKIE,
            cookie(
                SESSION_COOKIE,
                &session.session_token,
                session.expires_at,
                (session.expires_at - now).num_seconds(),
            ),
        ),
        (
            header::SET_COOKIE,
            cookie(
                REFRESH_COOKIE,
                &session.refresh_token,
                session.refresh_expiry,
                (session.refresh_expiry - now).num_seconds(),
            ),
        ),
    ]
}

/// Set-Cookie values that make the browser drop both tokens.
pub fn cleared_cookies() -> [(header::HeaderName, String); 2] {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    [
        (header::SET_COOKIE, cookie(SESSION_COOKIE, "", epoch, 0)),
        (header::SET_COOKIE, cookie(REFRESH_COOKIE, "", epoch, 0)),
    ]
}

/// Value of the named cookie from the `Cookie` request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Session token from the cookie, or from an `Authorization: Bearer` header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, SESSION_COOKIE).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}
