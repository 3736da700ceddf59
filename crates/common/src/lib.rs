//! Scribecast Common Utilities
//!
//! Shared infrastructure for all Scribecast crates:
//! - Error types and result aliases
//! - Recording clock that times each capture session
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
