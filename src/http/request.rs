//! Request descriptor.
//!
//! # Responsibilities
//! - Capture what the pipeline reads from a request: method, host, path, query
//! - Detect the visitor's session cookie
//! - Build the public URL that cache keys derive from
//!
//! # Design Decisions
//! - Only the URL and the `Cookie` header influence processing
//! - The descriptor is immutable once built
//! - A missing `Host` falls back to the URI authority, then `localhost`

use axum::http::{header, request::Parts, HeaderMap, Method};
use url::Url;

use crate::cache::key::public_url;

/// Header carrying the request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// What the pipeline knows about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Lowercased host, without userinfo.
    pub host: String,
    pub path: String,
    /// Path plus `?query` when present.
    pub path_and_query: String,
    /// A session cookie is present.
    pub authenticated: bool,
    pub request_id: String,
}

impl RequestDescriptor {
    pub fn from_parts(parts: &Parts, session_cookie: &str) -> Self {
        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string())
            .to_ascii_lowercase();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            method: parts.method.clone(),
            host,
            path: parts.uri.path().to_string(),
            path_and_query,
            authenticated: has_session_cookie(&parts.headers, session_cookie),
            request_id,
        }
    }

    /// URL as the visitor addressed it.
    pub fn public_url(&self, scheme: &str) -> Result<Url, url::ParseError> {
        public_url(scheme, &self.host, &self.path_and_query)
    }
}

/// True when any cookie name starts with `prefix`.
///
/// Session cookies carry a site hash suffix (`wordpress_logged_in_<hash>`),
/// so names are matched by prefix.
pub fn has_session_cookie(headers: &HeaderMap, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split('=').next())
        .any(|name| name.trim().starts_with(prefix))
}
