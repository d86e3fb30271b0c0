//! MongoDB coordination store backend using the official driver.

use crate::error::{GatewayError, GatewayResult};
use crate::traits::CoordinationStore;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{DateTime, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::options::{ReadPreference, ReturnDocument, SelectionCriteria};
use mongodb::{Client, Collection, IndexModel};
use muster_core::{LockerId, PartId, RequestId, RequestRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::instrument;

/// Mirrors the wide-column adapter's batch limit so one logical batch turns
/// into the same bounded round-trips on both backends.
const BATCH_LIMIT: usize = 25;

/// Server error code for a duplicate-key write.
const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Serialize, Deserialize)]
struct RequestDocument {
    #[serde(rename = "_id")]
    request_id: String,
    #[serde(rename = "CreationTime")]
    creation_time: DateTime,
    #[serde(rename = "ScatterCompleted")]
    scatter_completed: bool,
    #[serde(rename = "LockerId")]
    locker_id: Option<String>,
    #[serde(rename = "Context")]
    context: String,
}

/// Composite primary key of a part document. Field order matters: `_id`
/// equality compares embedded documents byte-wise, so every filter builds
/// the key in this same order.
#[derive(Debug, Serialize, Deserialize)]
struct PartKey {
    #[serde(rename = "PartId")]
    part_id: String,
    #[serde(rename = "RequestId")]
    request_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PartDocument {
    #[serde(rename = "_id")]
    id: PartKey,
}

fn part_key(request_id: &RequestId, part_id: &PartId) -> Document {
    doc! {
        "PartId": part_id.as_str(),
        "RequestId": request_id.as_str(),
    }
}

/// Re-inserting an existing part must read as success; anything beyond
/// duplicate-key write errors surfaces unchanged.
fn is_duplicate_key_only(err: &mongodb::error::Error) -> bool {
    match &*err.kind {
        ErrorKind::InsertMany(failure) => {
            failure.write_concern_error.is_none()
                && failure
                    .write_errors
                    .as_ref()
                    .is_some_and(|errors| errors.iter().all(|e| e.code == DUPLICATE_KEY))
        }
        _ => false,
    }
}

/// Document-store coordination backend over two collections,
/// `<prefix>.Requests` and `<prefix>.Parts`.
pub struct MongoBackend {
    requests: Collection<RequestDocument>,
    parts: Collection<PartDocument>,
    part_index: OnceCell<()>,
}

impl std::fmt::Debug for MongoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoBackend")
            .field("requests", &self.requests.name())
            .field("parts", &self.parts.name())
            .finish_non_exhaustive()
    }
}

impl MongoBackend {
    /// Create a new MongoDB backend.
    ///
    /// The driver connects lazily, so this performs no I/O beyond parsing
    /// the connection string. Collections are used as-is; only the part
    /// index is created, on first part access.
    pub async fn new(
        connection_string: &str,
        database: &str,
        collection_prefix: &str,
    ) -> GatewayResult<Self> {
        if database.is_empty() || collection_prefix.is_empty() {
            return Err(GatewayError::Config(
                "mongodb config requires non-empty database and collection_prefix".to_string(),
            ));
        }

        let client = Client::with_uri_str(connection_string).await?;
        let db = client.database(database);
        Ok(Self {
            requests: db.collection(&format!("{collection_prefix}.Requests")),
            parts: db.collection(&format!("{collection_prefix}.Parts")),
            part_index: OnceCell::new(),
        })
    }

    /// Reads must observe all linearised writes; pin them to the primary so
    /// a lagging secondary can never serve a stale "no parts" answer.
    fn primary_reads() -> SelectionCriteria {
        SelectionCriteria::ReadPreference(ReadPreference::Primary)
    }

    /// Create the ascending index on `_id.RequestId` once per process.
    ///
    /// The composite `_id` index cannot serve queries on its inner field, so
    /// the emptiness probe and cleanup enumeration need their own index to
    /// stay proportional to the matching rows.
    async fn ensure_part_index(&self) -> GatewayResult<()> {
        self.part_index
            .get_or_try_init(|| async {
                let index = IndexModel::builder()
                    .keys(doc! { "_id.RequestId": 1 })
                    .build();
                self.parts
                    .create_index(index)
                    .await
                    .map(|_| ())
                    .map_err(GatewayError::from)
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl CoordinationStore for MongoBackend {
    #[instrument(skip(self, record), fields(backend = "mongodb", request_id = %record.request_id))]
    async fn put_request(&self, record: &RequestRecord) -> GatewayResult<()> {
        let document = RequestDocument {
            request_id: record.request_id.as_str().to_string(),
            creation_time: DateTime::from_system_time(std::time::SystemTime::from(
                record.creation_time,
            )),
            scatter_completed: false,
            locker_id: None,
            context: record.context.clone(),
        };
        self.requests
            .replace_one(doc! { "_id": record.request_id.as_str() }, &document)
            .upsert(true)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "mongodb", request_id = %request_id))]
    async fn mark_scatter_completed(&self, request_id: &RequestId) -> GatewayResult<()> {
        self.requests
            .update_one(
                doc! { "_id": request_id.as_str() },
                doc! { "$set": { "ScatterCompleted": true } },
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "mongodb", request_id = %request_id, locker_id = %locker_id))]
    async fn try_claim_completion(
        &self,
        request_id: &RequestId,
        locker_id: &LockerId,
    ) -> GatewayResult<Option<String>> {
        // One findOneAndUpdate carries the whole condition; no match means
        // the flag is unset, another locker holds the row, or the row is
        // gone. All read as "no claim".
        let claimed = self
            .requests
            .find_one_and_update(
                doc! {
                    "_id": request_id.as_str(),
                    "ScatterCompleted": true,
                    "$or": [
                        { "LockerId": null },
                        { "LockerId": locker_id.as_str() },
                    ],
                },
                doc! { "$set": { "LockerId": locker_id.as_str() } },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(claimed.map(|document| document.context))
    }

    #[instrument(skip(self), fields(backend = "mongodb", request_id = %request_id))]
    async fn delete_request(&self, request_id: &RequestId) -> GatewayResult<()> {
        self.requests
            .delete_one(doc! { "_id": request_id.as_str() })
            .await?;
        Ok(())
    }

    #[instrument(skip(self, part_ids), fields(backend = "mongodb", request_id = %request_id, count = part_ids.len()))]
    async fn put_parts(&self, request_id: &RequestId, part_ids: &[PartId]) -> GatewayResult<()> {
        if part_ids.is_empty() {
            return Ok(());
        }
        self.ensure_part_index().await?;

        for chunk in part_ids.chunks(BATCH_LIMIT) {
            let documents: Vec<PartDocument> = chunk
                .iter()
                .map(|part_id| PartDocument {
                    id: PartKey {
                        part_id: part_id.as_str().to_string(),
                        request_id: request_id.as_str().to_string(),
                    },
                })
                .collect();

            match self.parts.insert_many(&documents).ordered(false).await {
                Ok(_) => {}
                Err(err) if is_duplicate_key_only(&err) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    #[instrument(skip(self, part_ids), fields(backend = "mongodb", request_id = %request_id, count = part_ids.len()))]
    async fn delete_parts(&self, request_id: &RequestId, part_ids: &[PartId]) -> GatewayResult<()> {
        for chunk in part_ids.chunks(BATCH_LIMIT) {
            let keys: Vec<Document> = chunk
                .iter()
                .map(|part_id| part_key(request_id, part_id))
                .collect();
            self.parts
                .delete_many(doc! { "_id": { "$in": keys } })
                .await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "mongodb", request_id = %request_id))]
    async fn any_parts_outstanding(&self, request_id: &RequestId) -> GatewayResult<bool> {
        self.ensure_part_index().await?;
        let found = self
            .parts
            .find_one(doc! { "_id.RequestId": request_id.as_str() })
            .selection_criteria(Self::primary_reads())
            .await?;
        Ok(found.is_some())
    }

    #[instrument(skip(self), fields(backend = "mongodb", request_id = %request_id))]
    async fn list_parts(&self, request_id: &RequestId) -> GatewayResult<Vec<PartId>> {
        self.ensure_part_index().await?;
        let mut cursor = self
            .parts
            .find(doc! { "_id.RequestId": request_id.as_str() })
            .selection_criteria(Self::primary_reads())
            .await?;

        let mut parts = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            parts.push(PartId::parse(document.id.part_id)?);
        }
        Ok(parts)
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}
