//! MebelPlace Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other MebelPlace crates:
//! - Application configuration (WebSocket endpoint, auth token, retry policy)
//! - Global error type
//! - Structured logging with tracing
//! - Platform directory lookup
//! - Common constants

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{MpError, MpResult};
pub use logging::init_logging;
