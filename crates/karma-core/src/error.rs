//! Error types for karma core.

use thiserror::Error;

/// Core errors that can occur while parsing or encoding karma data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid most kind: {0:?}")]
    InvalidKind(String),

    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("encoding error: {0}")]
    EncodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
