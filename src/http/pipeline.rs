//! Per-request edge pipeline.
//!
//! # Responsibilities
//! - Classify the request path, derive the cache key, try the cache
//! - Fetch the origin once on a miss
//! - Serve assets with policy headers, rewrite HTML candidates, relay the rest
//! - Schedule the cache write without waiting for it
//!
//! # Design Decisions
//! - Every failure short of "no response from origin" degrades to passthrough
//! - Bodies are buffered up to `max_body_bytes`; a longer body is relayed
//!   as received, unmodified and uncached
//! - HTML for logged-in visitors is rewritten but never looked up or stored
//! - Only `GET` takes the cache and rewrite paths
//! - Rules are read from one runtime snapshot for the whole request

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    response::Response,
};
use futures_util::{future, stream, StreamExt};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use arc_swap::ArcSwap;

use crate::cache::{CacheCoordinator, CacheKey, CachePolicy, CachedEntry, PolicyTable};
use crate::classify::{Classification, Classifier, PathClass};
use crate::config::EdgeConfig;
use crate::error::EdgeError;
use crate::http::request::RequestDescriptor;
use crate::http::response::{self, Assembly, CacheStatus};
use crate::observability::metrics;
use crate::rewrite::{HtmlRewriter, RewriteError};

/// Rules compiled from one configuration generation.
#[derive(Debug)]
pub struct Runtime {
    pub classifier: Classifier,
    pub policies: PolicyTable,
    pub rewriter: HtmlRewriter,
    pub origin: String,
    pub public_scheme: String,
    pub session_cookie: String,
    pub max_body_bytes: usize,
}

impl Runtime {
    pub fn compile(config: &EdgeConfig) -> Result<Self, RewriteError> {
        Ok(Self {
            classifier: Classifier::from_config(&config.classify),
            policies: PolicyTable::new(config.policy.clone()),
            rewriter: HtmlRewriter::from_config(&config.rewrite)?,
            origin: config.origin.address.clone(),
            public_scheme: config.origin.public_scheme.clone(),
            session_cookie: config.classify.session_cookie.clone(),
            max_body_bytes: config.cache.max_body_bytes,
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ArcSwap<Runtime>>,
    pub cache: CacheCoordinator,
    pub client: Client<HttpConnector, Body>,
}

/// Origin response with a buffered or streaming body.
struct OriginResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

/// An origin body read up to the buffering limit.
enum Buffered {
    Complete(Bytes),
    /// Over the limit: the bytes read so far followed by the unread rest.
    Overflow(Body),
}

/// Read `body` frame by frame until it ends or passes `limit` bytes.
async fn buffer_body(mut body: Body, limit: usize) -> Result<Buffered, axum::Error> {
    let mut buf = Vec::new();
    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        buf.extend_from_slice(&data);
        if buf.len() > limit {
            let prefix = stream::once(future::ready(Ok::<_, axum::Error>(Bytes::from(buf))));
            return Ok(Buffered::Overflow(Body::from_stream(
                prefix.chain(body.into_data_stream()),
            )));
        }
    }
    Ok(Buffered::Complete(Bytes::from(buf)))
}

/// Main edge handler.
pub async fn edge_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let runtime = state.runtime.load_full();
    let (parts, body) = request.into_parts();
    let request = RequestDescriptor::from_parts(&parts, &runtime.session_cookie);

    tracing::debug!(
        request_id = %request.request_id,
        method = %request.method,
        path = %request.path,
        authenticated = request.authenticated,
        "Handling request"
    );

    if request.method != Method::GET {
        let response = match fetch(&state, &runtime, &parts, body).await {
            Ok(origin) => response::passthrough(origin.status, origin.headers, origin.body),
            Err(e) => upstream_failure(&request, e),
        };
        metrics::record_request("method_passthrough", "BYPASS", response.status().as_u16(), start);
        return response;
    }

    let path_class = runtime.classifier.classify_request(&request.path);
    let key = cache_key(&runtime, &request, &path_class);

    if let Some(key) = &key {
        if let Some(entry) = state.cache.lookup(key).await {
            tracing::debug!(request_id = %request.request_id, key = %key, "Cache hit");
            let class = entry_class(&path_class);
            let response = response::from_cache(entry, SystemTime::now());
            metrics::record_request(class, "HIT", response.status().as_u16(), start);
            return response;
        }
    }

    let origin = match fetch(&state, &runtime, &parts, Body::empty()).await {
        Ok(origin) => origin,
        Err(e) => {
            let response = upstream_failure(&request, e);
            metrics::record_request(entry_class(&path_class), "BYPASS", 502, start);
            return response;
        }
    };

    let content_type = origin
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let class = runtime
        .classifier
        .classify_response(&request.path, content_type, origin.status);

    tracing::debug!(
        request_id = %request.request_id,
        class = %class,
        status = origin.status.as_u16(),
        "Classified origin response"
    );

    let (response, cache) = match &class {
        Classification::ImmutableAsset(_) | Classification::MutableAsset(_) => {
            serve_asset(&state, &runtime, &request, &class, key, origin).await
        }
        Classification::HtmlCandidate => {
            serve_document(&state, &runtime, &request, key, origin).await
        }
        Classification::AdminExcluded | Classification::NonHtmlPassthrough => (
            response::passthrough(origin.status, origin.headers, origin.body),
            CacheStatus::Bypass,
        ),
    };

    metrics::record_request(class.label(), cache.as_str(), response.status().as_u16(), start);
    response
}

/// Key for paths that may be cached; `None` when the request must bypass.
fn cache_key(runtime: &Runtime, request: &RequestDescriptor, class: &PathClass) -> Option<CacheKey> {
    let derive: fn(&url::Url) -> CacheKey = match class {
        PathClass::Asset(_) => CacheKey::for_asset,
        PathClass::Document if !request.authenticated => CacheKey::for_document,
        PathClass::Document | PathClass::Admin => return None,
    };
    match request.public_url(&runtime.public_scheme) {
        Ok(url) => Some(derive(&url)),
        Err(e) => {
            tracing::debug!(
                request_id = %request.request_id,
                error = %e,
                "Unparseable request URL, bypassing cache"
            );
            None
        }
    }
}

fn entry_class(class: &PathClass) -> &'static str {
    match class {
        PathClass::Asset(c) => c.label(),
        PathClass::Admin => Classification::AdminExcluded.label(),
        PathClass::Document => Classification::HtmlCandidate.label(),
    }
}

async fn serve_asset(
    state: &AppState,
    runtime: &Runtime,
    request: &RequestDescriptor,
    class: &Classification,
    key: Option<CacheKey>,
    origin: OriginResponse,
) -> (Response, CacheStatus) {
    let Some(policy) = runtime.policies.for_class(class) else {
        return bypass(origin);
    };
    if origin.status != StatusCode::OK || exceeds(&origin.headers, runtime.max_body_bytes) {
        return bypass(origin);
    }

    let body = match buffer_body(origin.body, runtime.max_body_bytes).await {
        Ok(Buffered::Complete(body)) => body,
        Ok(Buffered::Overflow(body)) => return relay_oversized(request, origin.status, origin.headers, body),
        Err(e) => return (upstream_failure(request, e.into()), CacheStatus::Bypass),
    };

    let headers = Assembly {
        origin: &origin.headers,
        policy: &policy,
        cache: CacheStatus::Miss,
        default_content_type: "application/octet-stream",
        keep_encoding: true,
    }
    .headers(SystemTime::now());

    finish(state, key, origin.status, headers, body, CacheStatus::Miss)
}

async fn serve_document(
    state: &AppState,
    runtime: &Runtime,
    request: &RequestDescriptor,
    key: Option<CacheKey>,
    origin: OriginResponse,
) -> (Response, CacheStatus) {
    if is_encoded(&origin.headers) {
        tracing::debug!(request_id = %request.request_id, "Encoded HTML from origin, not rewriting");
        return bypass(origin);
    }
    if exceeds(&origin.headers, runtime.max_body_bytes) {
        return bypass(origin);
    }

    let body = match buffer_body(origin.body, runtime.max_body_bytes).await {
        Ok(Buffered::Complete(body)) => body,
        Ok(Buffered::Overflow(body)) => return relay_oversized(request, origin.status, origin.headers, body),
        Err(e) => return (upstream_failure(request, e.into()), CacheStatus::Bypass),
    };

    let html = match std::str::from_utf8(&body) {
        Ok(html) => html,
        Err(e) => {
            tracing::debug!(request_id = %request.request_id, error = %e, "Non UTF-8 HTML, not rewriting");
            return (
                response::passthrough(origin.status, origin.headers, Body::from(body)),
                CacheStatus::Bypass,
            );
        }
    };

    let rewritten = match runtime.rewriter.rewrite(html, request.authenticated) {
        Ok(out) => Bytes::from(out),
        Err(e) => {
            tracing::warn!(request_id = %request.request_id, error = %e, "Rewrite failed, serving origin body");
            return (
                response::passthrough(origin.status, origin.headers, Body::from(body)),
                CacheStatus::Bypass,
            );
        }
    };

    let (policy, cache) = if request.authenticated {
        (CachePolicy::private(), CacheStatus::Bypass)
    } else {
        (runtime.policies.for_html(), CacheStatus::Miss)
    };
    let headers = Assembly {
        origin: &origin.headers,
        policy: &policy,
        cache,
        default_content_type: "text/html; charset=utf-8",
        keep_encoding: false,
    }
    .headers(SystemTime::now());

    let key = key.filter(|_| !request.authenticated);
    finish(state, key, origin.status, headers, rewritten, cache)
}

/// Respond, and schedule the store when the response is eligible.
fn finish(
    state: &AppState,
    key: Option<CacheKey>,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    cache: CacheStatus,
) -> (Response, CacheStatus) {
    if let Some(key) = key {
        if status == StatusCode::OK && cache == CacheStatus::Miss {
            state
                .cache
                .store(key, CachedEntry::new(status, headers.clone(), body.clone()));
        }
    }
    (response::assembled(status, headers, body), cache)
}

fn relay_oversized(
    request: &RequestDescriptor,
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
) -> (Response, CacheStatus) {
    tracing::debug!(request_id = %request.request_id, "Origin body over buffering limit, relaying as is");
    (response::passthrough(status, headers, body), CacheStatus::Bypass)
}

fn bypass(origin: OriginResponse) -> (Response, CacheStatus) {
    (
        response::passthrough(origin.status, origin.headers, origin.body),
        CacheStatus::Bypass,
    )
}

/// Declared length above the buffering limit.
fn exceeds(headers: &HeaderMap, limit: usize) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len > limit)
}

fn is_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().eq_ignore_ascii_case("identity"))
}

fn upstream_failure(request: &RequestDescriptor, error: EdgeError) -> Response {
    tracing::error!(
        request_id = %request.request_id,
        path = %request.path,
        error = %error,
        "Origin request failed"
    );
    response::bad_gateway()
}

/// Forward the request to the origin.
async fn fetch(
    state: &AppState,
    runtime: &Runtime,
    parts: &Parts,
    body: Body,
) -> Result<OriginResponse, EdgeError> {
    let request = origin_request(parts, &runtime.origin, body)?;
    let response: hyper::Response<Incoming> = state.client.request(request).await?;
    let (parts, body) = response.into_parts();
    Ok(OriginResponse {
        status: parts.status,
        headers: parts.headers,
        body: Body::new(body),
    })
}

/// Same method, path, query and headers, addressed to the origin.
fn origin_request(parts: &Parts, origin: &str, body: Body) -> Result<Request<Body>, EdgeError> {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = format!("http://{origin}{path_and_query}").parse()?;

    let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            headers.append(name.clone(), value.clone());
        }
        response::strip_hop_by_hop(headers);
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    }

    Ok(builder.body(body)?)
}
