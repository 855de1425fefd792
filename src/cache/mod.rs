//! Edge cache subsystem.
//!
//! # Data Flow
//! ```text
//! Classified request
//!     → key.rs (normalize URL: full for assets, query-stripped for HTML)
//!     → coordinator.rs lookup → store.rs
//!         hit  → serve stored bytes
//!         miss → origin + rewrite → coordinator.rs store (background)
//!
//! policy.rs supplies the lifetimes written into every cacheable response;
//! store.rs reads them back to decide when an entry expires.
//! ```
//!
//! # Design Decisions
//! - One store, one key space for assets and HTML
//! - Writes never block the response path
//! - Concurrent misses on one key each store; writes are idempotent
//! - No invalidation: staleness is bounded by the stored TTL

pub mod coordinator;
pub mod key;
pub mod policy;
pub mod store;

pub use coordinator::CacheCoordinator;
pub use key::CacheKey;
pub use policy::{CachePolicy, PolicyTable};
pub use store::{CacheStore, CachedEntry, MemoryStore, StoreError};
