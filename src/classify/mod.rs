//! Request classification subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request URL
//!     → classifier.rs (asset extension? admin prefix?)
//!     → matcher.rs (evaluate path conditions)
//!     → decided early (asset / admin) or pending the origin response
//!
//! Origin response (content-type, status)
//!     → classifier.rs completes the decision
//!     → HtmlCandidate or passthrough
//! ```
//!
//! # Design Decisions
//! - Rules compiled at startup, immutable at runtime
//! - Classification is recomputed for every request, never cached
//! - Unparseable URLs fail open to passthrough

pub mod classifier;
pub mod matcher;

pub use classifier::{AssetKind, Classification, Classifier, PathClass};
