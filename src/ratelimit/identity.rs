//! Client Identity
//!
//! Derives the string a caller is counted under.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Headers consulted in priority order; the first non-empty one wins.
const IDENTITY_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "x-client-ip"];

/// Identity used when nothing identifies the caller.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Caller identity from proxy headers, then the transport peer address.
///
/// Only the first hop of `X-Forwarded-For` is used.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    IDENTITY_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}
