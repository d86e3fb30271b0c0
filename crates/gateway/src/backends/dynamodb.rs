//! DynamoDB coordination store backend using the AWS SDK.

use crate::error::{GatewayError, GatewayResult};
use crate::traits::CoordinationStore;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, PutRequest, ReturnValue, Select, WriteRequest,
};
use muster_core::{LockerId, PartId, RequestId, RequestRecord};
use std::collections::HashMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

/// DynamoDB caps BatchWriteItem at 25 items per call.
const BATCH_WRITE_LIMIT: usize = 25;

const ATTR_REQUEST_ID: &str = "RequestId";
const ATTR_PART_ID: &str = "PartId";
const ATTR_CREATION_TIME: &str = "CreationTime";
const ATTR_CONTEXT: &str = "Context";
const ATTR_SCATTER_COMPLETED: &str = "ScatterCompleted";

/// Condition under which the completion critical section may be claimed.
/// Re-entrant for the locker already recorded on the row.
const CLAIM_CONDITION: &str =
    "ScatterCompleted = :completed AND (attribute_not_exists(LockerId) OR LockerId = :locker)";

fn map_sdk_error<E>(err: SdkError<E>) -> GatewayError
where
    E: std::error::Error + Send + Sync + 'static,
{
    GatewayError::DynamoDb(Box::new(err))
}

fn map_build_error(err: aws_sdk_dynamodb::error::BuildError) -> GatewayError {
    GatewayError::DynamoDb(Box::new(err))
}

fn format_creation_time(creation_time: OffsetDateTime) -> GatewayResult<String> {
    creation_time.format(&Rfc3339).map_err(|e| {
        GatewayError::MalformedRecord(format!("unformattable creation time: {e}"))
    })
}

/// Wide-column coordination store over two DynamoDB tables.
///
/// The request table is keyed by `RequestId`; the part table by
/// `(RequestId, PartId)`, so both part reads are a single-partition query.
/// Tables are assumed pre-created with that key schema.
pub struct DynamoBackend {
    client: Client,
    requests_table: String,
    parts_table: String,
}

impl std::fmt::Debug for DynamoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoBackend")
            .field("requests_table", &self.requests_table)
            .field("parts_table", &self.parts_table)
            .finish_non_exhaustive()
    }
}

impl DynamoBackend {
    /// Create a new DynamoDB backend.
    ///
    /// Without explicit credentials the ambient AWS credential chain is used.
    /// `endpoint` points the client at a local emulator; bare `host:port`
    /// values get an `http://` scheme prepended.
    pub async fn new(
        requests_table: &str,
        parts_table: &str,
        region: Option<String>,
        endpoint: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    ) -> GatewayResult<Self> {
        let has_access_key_id = access_key_id.is_some();
        let has_secret_access_key = secret_access_key.is_some();
        if has_access_key_id ^ has_secret_access_key {
            return Err(GatewayError::Config(
                "dynamodb config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());

        // Explicit credentials keep construction free of ambient side effects;
        // otherwise the shared-config loader wires up the default chain.
        let mut config_builder = if let (Some(key_id), Some(secret)) =
            (access_key_id, secret_access_key)
        {
            let credentials = aws_sdk_dynamodb::config::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiration
                "muster-config",
            );
            aws_sdk_dynamodb::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(aws_config::Region::new(resolved_region))
                .credentials_provider(credentials)
        } else {
            let shared_config = aws_config::defaults(BehaviorVersion::latest())
                .region(aws_config::Region::new(resolved_region))
                .load()
                .await;
            aws_sdk_dynamodb::config::Builder::from(&shared_config)
        };

        if let Some(endpoint_url) = endpoint {
            // Handle bare host:port endpoints (e.g., "localhost:8000") by prepending http://
            let endpoint_lower = endpoint_url.to_lowercase();
            let normalized = if endpoint_lower.starts_with("http://")
                || endpoint_lower.starts_with("https://")
            {
                endpoint_url
            } else {
                format!("http://{}", endpoint_url)
            };
            config_builder = config_builder.endpoint_url(normalized);
        }

        Ok(Self {
            client: Client::from_conf(config_builder.build()),
            requests_table: requests_table.to_string(),
            parts_table: parts_table.to_string(),
        })
    }

    fn request_key(&self, request_id: &RequestId) -> (&'static str, AttributeValue) {
        (
            ATTR_REQUEST_ID,
            AttributeValue::S(request_id.as_str().to_string()),
        )
    }

    /// Run one logical batch against the part table, re-driving unprocessed
    /// writes until DynamoDB accepts everything.
    async fn write_part_batch(&self, writes: Vec<WriteRequest>) -> GatewayResult<()> {
        for chunk in writes.chunks(BATCH_WRITE_LIMIT) {
            let mut pending = chunk.to_vec();
            while !pending.is_empty() {
                let output = self
                    .client
                    .batch_write_item()
                    .request_items(self.parts_table.clone(), pending)
                    .send()
                    .await
                    .map_err(map_sdk_error)?;

                pending = output
                    .unprocessed_items()
                    .and_then(|items| items.get(&self.parts_table))
                    .cloned()
                    .unwrap_or_default();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for DynamoBackend {
    #[instrument(skip(self, record), fields(backend = "dynamodb", request_id = %record.request_id))]
    async fn put_request(&self, record: &RequestRecord) -> GatewayResult<()> {
        // PutItem replaces the whole item, so a re-created request carries no
        // stale LockerId.
        self.client
            .put_item()
            .table_name(&self.requests_table)
            .item(
                ATTR_REQUEST_ID,
                AttributeValue::S(record.request_id.as_str().to_string()),
            )
            .item(
                ATTR_CREATION_TIME,
                AttributeValue::S(format_creation_time(record.creation_time)?),
            )
            .item(ATTR_CONTEXT, AttributeValue::S(record.context.clone()))
            .item(ATTR_SCATTER_COMPLETED, AttributeValue::Bool(false))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "dynamodb", request_id = %request_id))]
    async fn mark_scatter_completed(&self, request_id: &RequestId) -> GatewayResult<()> {
        let (key_name, key_value) = self.request_key(request_id);
        self.client
            .update_item()
            .table_name(&self.requests_table)
            .key(key_name, key_value)
            .update_expression("SET ScatterCompleted = :completed")
            .expression_attribute_values(":completed", AttributeValue::Bool(true))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "dynamodb", request_id = %request_id, locker_id = %locker_id))]
    async fn try_claim_completion(
        &self,
        request_id: &RequestId,
        locker_id: &LockerId,
    ) -> GatewayResult<Option<String>> {
        let (key_name, key_value) = self.request_key(request_id);
        let outcome = self
            .client
            .update_item()
            .table_name(&self.requests_table)
            .key(key_name, key_value)
            .update_expression("SET LockerId = :locker")
            .condition_expression(CLAIM_CONDITION)
            .expression_attribute_values(":completed", AttributeValue::Bool(true))
            .expression_attribute_values(
                ":locker",
                AttributeValue::S(locker_id.as_str().to_string()),
            )
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                // A missing row fails the condition the same way a held
                // locker does; only genuine transport/service faults surface.
                if let SdkError::ServiceError(service_err) = &err {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Ok(None);
                    }
                }
                return Err(map_sdk_error(err));
            }
        };

        let context = output
            .attributes()
            .and_then(|attributes| attributes.get(ATTR_CONTEXT))
            .and_then(|value| value.as_s().ok())
            .ok_or_else(|| {
                GatewayError::MalformedRecord(format!(
                    "request row {request_id} has no {ATTR_CONTEXT} attribute"
                ))
            })?;
        Ok(Some(context.clone()))
    }

    #[instrument(skip(self), fields(backend = "dynamodb", request_id = %request_id))]
    async fn delete_request(&self, request_id: &RequestId) -> GatewayResult<()> {
        let (key_name, key_value) = self.request_key(request_id);
        self.client
            .delete_item()
            .table_name(&self.requests_table)
            .key(key_name, key_value)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    #[instrument(skip(self, part_ids), fields(backend = "dynamodb", request_id = %request_id, count = part_ids.len()))]
    async fn put_parts(&self, request_id: &RequestId, part_ids: &[PartId]) -> GatewayResult<()> {
        if part_ids.is_empty() {
            return Ok(());
        }
        let writes = part_ids
            .iter()
            .map(|part_id| {
                let put = PutRequest::builder()
                    .item(
                        ATTR_REQUEST_ID,
                        AttributeValue::S(request_id.as_str().to_string()),
                    )
                    .item(ATTR_PART_ID, AttributeValue::S(part_id.as_str().to_string()))
                    .build()
                    .map_err(map_build_error)?;
                Ok(WriteRequest::builder().put_request(put).build())
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        self.write_part_batch(writes).await
    }

    #[instrument(skip(self, part_ids), fields(backend = "dynamodb", request_id = %request_id, count = part_ids.len()))]
    async fn delete_parts(&self, request_id: &RequestId, part_ids: &[PartId]) -> GatewayResult<()> {
        if part_ids.is_empty() {
            return Ok(());
        }
        let writes = part_ids
            .iter()
            .map(|part_id| {
                let delete = DeleteRequest::builder()
                    .key(
                        ATTR_REQUEST_ID,
                        AttributeValue::S(request_id.as_str().to_string()),
                    )
                    .key(ATTR_PART_ID, AttributeValue::S(part_id.as_str().to_string()))
                    .build()
                    .map_err(map_build_error)?;
                Ok(WriteRequest::builder().delete_request(delete).build())
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        self.write_part_batch(writes).await
    }

    #[instrument(skip(self), fields(backend = "dynamodb", request_id = %request_id))]
    async fn any_parts_outstanding(&self, request_id: &RequestId) -> GatewayResult<bool> {
        let output = self
            .client
            .query()
            .table_name(&self.parts_table)
            .key_condition_expression("RequestId = :request")
            .expression_attribute_values(
                ":request",
                AttributeValue::S(request_id.as_str().to_string()),
            )
            .consistent_read(true)
            .limit(1)
            .select(Select::Count)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(output.count() > 0)
    }

    #[instrument(skip(self), fields(backend = "dynamodb", request_id = %request_id))]
    async fn list_parts(&self, request_id: &RequestId) -> GatewayResult<Vec<PartId>> {
        let mut parts = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.parts_table)
                .key_condition_expression("RequestId = :request")
                .expression_attribute_values(
                    ":request",
                    AttributeValue::S(request_id.as_str().to_string()),
                )
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(map_sdk_error)?;

            for item in output.items() {
                let part = item
                    .get(ATTR_PART_ID)
                    .and_then(|value| value.as_s().ok())
                    .ok_or_else(|| {
                        GatewayError::MalformedRecord(format!(
                            "part row for {request_id} has no {ATTR_PART_ID} attribute"
                        ))
                    })?;
                parts.push(PartId::parse(part.clone())?);
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(parts)
    }

    fn backend_name(&self) -> &'static str {
        "dynamodb"
    }
}
