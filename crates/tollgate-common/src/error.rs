//! Error types for the Tollgate pipeline
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using TollgateError
pub type Result<T> = std::result::Result<T, TollgateError>;

/// Unified error type for Tollgate operations
#[derive(Debug, Error)]
pub enum TollgateError {
    // Event validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // Byte meter errors
    #[error("Meter error: {0}")]
    Meter(#[from] MeterError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Delivery queue at capacity
    #[error("Queue full: capacity {0}")]
    QueueFull(usize),

    // Stage no longer accepting events
    #[error("Closed: {0}")]
    Closed(&'static str),

    // Metrics registration errors
    #[error("Metrics error: {0}")]
    Metrics(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Event validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("events must contain {0}")]
    MissingField(&'static str),
}

/// Byte meter errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeterError {
    #[error("negative {kind} byte count: {value}")]
    NegativeByteCount { kind: &'static str, value: i64 },
}

impl From<serde_json::Error> for TollgateError {
    fn from(err: serde_json::Error) -> Self {
        TollgateError::Serialization(err.to_string())
    }
}
