//! Common error types for ergopool.
//!
//! This module provides a centralized Error enum using thiserror,
//! with conversions from underlying error types used throughout the crate.
//! Share rejection has its own taxonomy in [`crate::share`] because those
//! outcomes are protocol answers to miners, not server faults.

use thiserror::Error;

/// Main error type for ergopool operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP errors talking to the upstream node
    #[error("Node error: {0}")]
    Node(#[from] reqwest::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol errors (malformed or unexpected upstream data)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Pool orchestration errors
    #[error("Pool error: {0}")]
    Pool(String),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
