//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request id: {0}")]
    InvalidRequestId(String),

    #[error("invalid part id: {0}")]
    InvalidPartId(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
