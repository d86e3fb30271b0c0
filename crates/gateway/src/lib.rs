//! Durable scatter-gather coordination for distributed workers.
//!
//! This crate provides:
//! - The coordination protocol: begin/scatter/end/gather transitions with
//!   race-free completion detection and single-winner handler election
//! - The persistence port the protocol runs against
//! - Backends: DynamoDB (wide-column) and MongoDB (document store)
//!
//! The scatterer calls [`ScatterGatherGateway::begin_scatter`], any number of
//! [`ScatterGatherGateway::scatter`] calls, then
//! [`ScatterGatherGateway::end_scatter`]; workers concurrently call
//! [`ScatterGatherGateway::gather`]. Exactly one of the contending callers
//! runs the completion handler once every part is gathered.

pub mod backends;
pub mod error;
pub mod gateway;
pub mod traits;

pub use backends::{dynamodb::DynamoBackend, mongodb::MongoBackend};
pub use error::{GatewayError, GatewayResult};
pub use gateway::ScatterGatherGateway;
pub use traits::CoordinationStore;

use muster_core::BackendConfig;
use std::sync::Arc;

/// Create a gateway from configuration.
pub async fn from_config(config: &BackendConfig) -> GatewayResult<ScatterGatherGateway> {
    config.validate().map_err(GatewayError::Config)?;

    match config {
        BackendConfig::DynamoDb {
            requests_table,
            parts_table,
            region,
            endpoint,
            access_key_id,
            secret_access_key,
        } => {
            let backend = DynamoBackend::new(
                requests_table,
                parts_table,
                region.clone(),
                endpoint.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
            )
            .await?;
            Ok(ScatterGatherGateway::new(Arc::new(backend)))
        }
        BackendConfig::MongoDb {
            connection_string,
            database,
            collection_prefix,
        } => {
            let backend = MongoBackend::new(connection_string, database, collection_prefix).await?;
            Ok(ScatterGatherGateway::new(Arc::new(backend)))
        }
    }
}
