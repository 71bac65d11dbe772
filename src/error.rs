//! Error types for the value cache

use thiserror::Error;

use crate::cache::ValueType;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the value cache
#[derive(Error, Debug)]
pub enum Error {
    /// The cache was configured with a zero size
    #[error("value cache is disabled")]
    Disabled,

    /// Arena allocation failed even after releasing space
    #[error("value cache is out of space (requested {requested} bytes)")]
    OutOfSpace { requested: usize },

    /// No cached or stored value matches the request
    #[error("no matching value found")]
    NotFound,

    /// Backing history store failure, propagated verbatim
    #[error("history store error: {0}")]
    BackingStore(String),

    /// Record payload does not match the requested value type
    #[error("value type mismatch: expected {expected}, found {found}")]
    ValueTypeMismatch { expected: ValueType, found: ValueType },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Size parse error
    #[error("Failed to parse size: {0}")]
    SizeParse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML decode error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    /// Prometheus registry or encoder error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the caller should fall back to reading the history store directly
    pub fn is_fallback(&self) -> bool {
        matches!(self, Error::Disabled | Error::OutOfSpace { .. })
    }
}
