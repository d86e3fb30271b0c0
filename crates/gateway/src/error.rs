//! Gateway error types.

use thiserror::Error;

/// Gateway operation errors.
///
/// A failed conditional claim is not an error: the port maps it to "no
/// claim" and the protocol reports `Completion::Pending`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Domain(#[from] muster_core::Error),

    #[error("DynamoDB error: {0}")]
    DynamoDb(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("MongoDB error: {0}")]
    MongoDb(#[from] mongodb::error::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("gather requires at least one part id")]
    EmptyGather,

    #[error("malformed backend row: {0}")]
    MalformedRecord(String),

    #[error("completion handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl GatewayError {
    /// Wrap an arbitrary user-callback failure.
    pub fn handler(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Handler(Box::new(err))
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
