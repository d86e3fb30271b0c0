//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};

/// Coordination backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Amazon DynamoDB (wide-column) backend.
    ///
    /// Both tables are assumed pre-created: the request table with partition
    /// key `RequestId` (S), the part table with partition key `RequestId` (S)
    /// and sort key `PartId` (S).
    DynamoDb {
        /// Table holding one row per live request.
        requests_table: String,
        /// Table holding one row per outstanding part.
        parts_table: String,
        /// AWS region.
        region: Option<String>,
        /// Optional endpoint URL (for DynamoDB Local, etc.).
        endpoint: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
    },
    /// MongoDB (document store) backend.
    ///
    /// Uses the collections `<collection_prefix>.Requests` and
    /// `<collection_prefix>.Parts`; the part index is created on first use.
    MongoDb {
        /// Driver connection string (e.g., "mongodb://localhost:27017").
        connection_string: String,
        /// Database name.
        database: String,
        /// Prefix shared by the two collection names.
        collection_prefix: String,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::MongoDb {
            connection_string: "mongodb://localhost:27017".to_string(),
            database: "muster".to_string(),
            collection_prefix: "muster".to_string(),
        }
    }
}

impl BackendConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BackendConfig::DynamoDb {
                requests_table,
                parts_table,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if requests_table.is_empty() || parts_table.is_empty() {
                    return Err("dynamodb config requires non-empty table names".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "dynamodb config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            BackendConfig::MongoDb {
                database,
                collection_prefix,
                ..
            } => {
                if database.is_empty() || collection_prefix.is_empty() {
                    return Err(
                        "mongodb config requires non-empty database and collection_prefix"
                            .to_string(),
                    );
                }
                Ok(())
            }
        }
    }
}
