//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EdgeConfig (validated, immutable)
//!     → compiled into rule sets shared via Arc
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server recompiles rules and swaps them atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    CacheConfig, ClassifyConfig, EdgeConfig, HintConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, OriginConfig, PolicyConfig, RewriteConfig, RewriteMode, TimeoutConfig,
};
pub use loader::{load_config, parse_config, ConfigError};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
