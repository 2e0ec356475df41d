//! Global error types for the MebelPlace realtime client.
//!
//! Every fallible construction, configuration, and CLI path returns
//! `MpResult`. Runtime transport problems are not errors at this level:
//! they surface as `error` events on the connection instead.

use thiserror::Error;

/// Convenience type alias for Results using MpError.
pub type MpResult<T> = Result<T, MpError>;

/// Unified error type for the realtime client.
#[derive(Error, Debug)]
pub enum MpError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// A configured endpoint could not be parsed as a URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    // -- Socket errors --
    /// The transport could not be opened or failed mid-session.
    #[error("socket error: {0}")]
    Socket(String),

    /// An operation needed an open connection and there was none.
    #[error("socket not connected")]
    NotConnected,

    /// A connection was created outside of a Tokio runtime.
    #[error("no tokio runtime available: {0}")]
    Runtime(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for MpError {
    fn from(e: serde_json::Error) -> Self {
        MpError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for MpError {
    fn from(e: toml::de::Error) -> Self {
        MpError::Config(e.to_string())
    }
}

impl From<url::ParseError> for MpError {
    fn from(e: url::ParseError) -> Self {
        MpError::InvalidUrl(e.to_string())
    }
}
