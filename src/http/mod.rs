//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, timeout)
//!     → request.rs (host, path, session cookie)
//!     → pipeline.rs (classify, cache lookup, origin fetch, rewrite)
//!     → response.rs (policy headers, Vary merge, allowlist)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestDescriptor, X_REQUEST_ID};
pub use response::{CacheStatus, X_EDGE_CACHE};
pub use server::EdgeServer;
