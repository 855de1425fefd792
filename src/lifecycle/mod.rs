//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain background writes → Exit
//!
//! Background work (background.rs):
//!     Request handler → spawn cache write → respond without waiting
//! ```
//!
//! # Design Decisions
//! - Background tasks are fire-and-forget; the request never observes them
//! - Shutdown drain has a deadline: unfinished writes are abandoned

pub mod background;
pub mod shutdown;

pub use background::BackgroundTasks;
pub use shutdown::{wait_for_signal, Shutdown};
