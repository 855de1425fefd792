//! Response assembly.
//!
//! # Responsibilities
//! - Compose outbound headers from the origin response and a cache policy
//! - Merge `Vary` with the origin's value instead of replacing it
//! - Copy a small allowlist of security headers from the origin
//! - Mark every response with its cache outcome (`x-edge-cache`)
//!
//! # Design Decisions
//! - Assembled responses start from an empty header map: origin headers
//!   outside the allowlist never reach the visitor
//! - Passthrough responses keep the origin headers, minus hop-by-hop ones
//! - Cache hits are served from the stored headers plus `Age`

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use std::time::SystemTime;

use crate::cache::policy::CachePolicy;
use crate::cache::store::{CachedEntry, CDN_CACHE_CONTROL};

/// Observability marker: `HIT`, `MISS` or `BYPASS`.
pub static X_EDGE_CACHE: HeaderName = HeaderName::from_static("x-edge-cache");

/// Origin headers copied verbatim onto assembled responses.
const SECURITY_ALLOWLIST: [HeaderName; 3] = [
    header::CONTENT_SECURITY_POLICY,
    header::STRICT_TRANSPORT_SECURITY,
    header::X_FRAME_OPTIONS,
];

const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// How a response relates to the edge cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Not eligible for the cache at all.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

/// Inputs for one assembled response.
#[derive(Debug)]
pub struct Assembly<'a> {
    pub origin: &'a HeaderMap,
    pub policy: &'a CachePolicy,
    pub cache: CacheStatus,
    /// Used when the origin declared no content type.
    pub default_content_type: &'static str,
    /// Keep the origin's `Content-Encoding` (bytes are relayed unchanged).
    pub keep_encoding: bool,
}

impl Assembly<'_> {
    /// Build the outbound header map.
    pub fn headers(&self, now: SystemTime) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let content_type = self
            .origin
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(self.default_content_type));
        headers.insert(header::CONTENT_TYPE, content_type);

        insert(&mut headers, header::CACHE_CONTROL, &self.policy.cache_control());
        insert(&mut headers, CDN_CACHE_CONTROL.clone(), &self.policy.cdn_cache_control());
        if let Some(expires) = self.policy.expires(now) {
            insert(&mut headers, header::EXPIRES, &expires);
        }
        insert(&mut headers, header::VARY, &merge_vary(self.origin, self.policy.vary));
        headers.insert(X_EDGE_CACHE.clone(), self.cache.header_value());
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );

        for name in SECURITY_ALLOWLIST.iter() {
            for value in self.origin.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        if self.keep_encoding {
            if let Some(encoding) = self.origin.get(header::CONTENT_ENCODING) {
                headers.insert(header::CONTENT_ENCODING, encoding.clone());
            }
        }

        headers
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, value = %value, "Dropping invalid header value"),
    }
}

/// Origin `Vary` tokens followed by `ours`, deduplicated case-insensitively.
pub fn merge_vary(origin: &HeaderMap, ours: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();
    let existing = origin
        .get_all(header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim);

    for token in existing.chain(std::iter::once(ours)) {
        if token.is_empty() {
            continue;
        }
        if token == "*" {
            return "*".to_string();
        }
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            tokens.push(token.to_string());
        }
    }

    tokens.join(", ")
}

/// Drop connection-scoped headers before relaying.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Response with freshly assembled headers.
pub fn assembled(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Serve a stored entry: the stored headers, marked as a hit, plus `Age`.
pub fn from_cache(entry: CachedEntry, now: SystemTime) -> Response {
    let age = entry.age(now);
    let mut headers = entry.headers;
    headers.insert(X_EDGE_CACHE.clone(), CacheStatus::Hit.header_value());
    headers.insert(header::AGE, HeaderValue::from(age));
    assembled(entry.status, headers, entry.body)
}

/// Relay an origin response unchanged apart from hop-by-hop headers.
pub fn passthrough(status: StatusCode, mut headers: HeaderMap, body: Body) -> Response {
    strip_hop_by_hop(&mut headers);
    headers.insert(X_EDGE_CACHE.clone(), CacheStatus::Bypass.header_value());
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Plain-text error produced by the edge itself.
pub fn bad_gateway() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(X_EDGE_CACHE.clone(), CacheStatus::Bypass.header_value());
    assembled(
        StatusCode::BAD_GATEWAY,
        headers,
        Bytes::from_static(b"Origin request failed"),
    )
}
