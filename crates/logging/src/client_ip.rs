use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Headers consulted in order; the first non-empty value wins.
const FORWARDING_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
    "true-client-ip",
];

/// Resolve the client address for a request.
///
/// `X-Forwarded-For` contributes only its first (client-most) entry. Falls
/// back to the transport peer when no header carries a value.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    FORWARDING_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
