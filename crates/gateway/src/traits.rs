//! Persistence port for the coordination protocol.

use crate::error::GatewayResult;
use async_trait::async_trait;
use muster_core::{LockerId, PartId, RequestId, RequestRecord};

/// Minimal persistence capabilities the coordination protocol requires.
///
/// Any store offering an atomic single-row conditional write and a
/// strongly-consistent existence query can host a correct implementation.
/// Two guarantees are load-bearing: [`try_claim_completion`] must be a single
/// conditional write, and [`any_parts_outstanding`] / [`list_parts`] must not
/// be served from a stale replica. A stale "no parts" read followed by a
/// successful claim would fire completion while parts still exist.
///
/// Implementations hold no protocol logic; every invariant lives in the
/// gateway.
///
/// [`try_claim_completion`]: CoordinationStore::try_claim_completion
/// [`any_parts_outstanding`]: CoordinationStore::any_parts_outstanding
/// [`list_parts`]: CoordinationStore::list_parts
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Insert or replace the request row with the scatter flag unset and no
    /// locker recorded. Idempotent with respect to re-invocation.
    async fn put_request(&self, record: &RequestRecord) -> GatewayResult<()>;

    /// Unconditionally set the scatter-completed flag. No-op if already set.
    async fn mark_scatter_completed(&self, request_id: &RequestId) -> GatewayResult<()>;

    /// Atomically claim the completion critical section.
    ///
    /// Records `locker_id` iff the scatter-completed flag is set and the row
    /// carries no other locker. Returns the stored context on success and
    /// `None` when the condition does not hold (flag unset, another locker,
    /// or no such row). Condition failure is never an error.
    async fn try_claim_completion(
        &self,
        request_id: &RequestId,
        locker_id: &LockerId,
    ) -> GatewayResult<Option<String>>;

    /// Delete the request row. Absent rows are not an error.
    async fn delete_request(&self, request_id: &RequestId) -> GatewayResult<()>;

    /// Insert part rows. Re-inserting an existing `(request, part)` pair must
    /// read as success. Batches above the backend's native limit are chunked
    /// transparently.
    async fn put_parts(&self, request_id: &RequestId, part_ids: &[PartId]) -> GatewayResult<()>;

    /// Delete part rows. Absent rows are silently ignored.
    async fn delete_parts(&self, request_id: &RequestId, part_ids: &[PartId]) -> GatewayResult<()>;

    /// Strongly-consistent probe: does at least one part row remain?
    async fn any_parts_outstanding(&self, request_id: &RequestId) -> GatewayResult<bool>;

    /// Strongly-consistent enumeration of every remaining part row.
    ///
    /// One call may return a bounded page; callers loop until empty.
    async fn list_parts(&self, request_id: &RequestId) -> GatewayResult<Vec<PartId>>;

    /// Static identifier of this backend, used for logging.
    fn backend_name(&self) -> &'static str;
}
