//! Pipeline errors.
//!
//! None of these reach the visitor as-is: the pipeline turns each one into a
//! passthrough or a `502 Bad Gateway` and logs it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdgeError {
    /// The origin could not be reached or closed the connection early.
    #[error("origin request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// A body could not be read in full (or exceeded the buffer limit).
    #[error("failed to read body: {0}")]
    Body(#[from] axum::Error),

    #[error("invalid origin URI: {0}")]
    InvalidUri(#[from] axum::http::uri::InvalidUri),

    #[error("failed to build origin request: {0}")]
    Request(#[from] axum::http::Error),
}
