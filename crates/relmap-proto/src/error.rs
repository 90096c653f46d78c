//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding protocol types.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A named query document could not be read.
    #[error("invalid named query document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}
