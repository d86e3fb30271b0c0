//! The coordination core: scatter/gather transitions and completion election.

use crate::error::{GatewayError, GatewayResult};
use crate::traits::CoordinationStore;
use muster_core::{Completion, LockerId, PartId, RequestId, RequestRecord};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Durable scatter-gather coordination gateway.
///
/// Tracks a logical operation split into many independently gathered parts
/// and elects exactly one caller to run the completion handler once every
/// part has been gathered. All state lives behind the [`CoordinationStore`]
/// port, so coordination survives process restarts and spans workers in
/// separate processes or machines.
///
/// The gateway holds no in-process state beyond the store handle; it is
/// cheap to clone and safe to share across tasks. Each operation is a short
/// sequence of persistent round-trips, so a caller abandoned mid-operation
/// leaves the store in a state a later call can drive forward.
#[derive(Clone)]
pub struct ScatterGatherGateway {
    store: Arc<dyn CoordinationStore>,
}

impl fmt::Debug for ScatterGatherGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatterGatherGateway")
            .field("backend", &self.store.backend_name())
            .finish_non_exhaustive()
    }
}

impl ScatterGatherGateway {
    /// Create a gateway over any coordination store.
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Start (or restart) a scatter-gather operation.
    ///
    /// Any residual state recorded under `request_id` is wiped first, so a
    /// retried operation begins a clean epoch: parts added before this call
    /// can no longer trigger completion. The completion handler of the new
    /// epoch observes exactly the `context` supplied here; mutating context
    /// mid-epoch is undefined.
    pub async fn begin_scatter(
        &self,
        request_id: &RequestId,
        context: &str,
    ) -> GatewayResult<()> {
        debug!(request_id = %request_id, "begin scatter");
        self.wipe(request_id).await?;
        self.store
            .put_request(&RequestRecord::new(request_id.clone(), context))
            .await
    }

    /// Record parts, then hand them to the dispatcher.
    ///
    /// Part rows are persisted before `dispatch` runs, so a worker
    /// acknowledging a dispatched part always observes its row; the reverse
    /// order would let a fast worker gather a part that is not yet recorded
    /// and fire completion prematurely. The dispatcher's return value is
    /// passed through, and its error propagates unchanged with the parts left
    /// in place. A persistence failure aborts before `dispatch` runs.
    ///
    /// Duplicate part ids, within one call or across calls, are tolerated.
    /// An empty `part_ids` slice records nothing and still runs `dispatch`.
    /// Scattering onto a request that already completed writes orphan part
    /// rows; callers are expected not to.
    pub async fn scatter<D, Fut, T>(
        &self,
        request_id: &RequestId,
        part_ids: &[PartId],
        dispatch: D,
    ) -> GatewayResult<T>
    where
        D: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.store.put_parts(request_id, part_ids).await?;
        dispatch().await
    }

    /// Declare the part set closed and attempt completion once.
    ///
    /// After this returns, no further [`scatter`](Self::scatter) calls are
    /// expected for the epoch; the protocol tolerates a late one but offers
    /// no guarantee it will trigger a subsequent completion.
    pub async fn end_scatter<H, Fut>(
        &self,
        request_id: &RequestId,
        on_completed: H,
    ) -> GatewayResult<Completion>
    where
        H: FnOnce(String) -> Fut,
        Fut: Future<Output = GatewayResult<()>>,
    {
        self.store.mark_scatter_completed(request_id).await?;
        let locker_id = LockerId::for_end_scatter(request_id);
        self.try_complete(request_id, &locker_id, on_completed).await
    }

    /// Remove gathered parts and attempt completion once.
    ///
    /// Requires at least one part id; the first one keys the completion
    /// critical section, so a retry should present the same first part id to
    /// be recognised as re-entrant. Deleting an already-absent part is not an
    /// error.
    pub async fn gather<H, Fut>(
        &self,
        request_id: &RequestId,
        part_ids: &[PartId],
        on_completed: H,
    ) -> GatewayResult<Completion>
    where
        H: FnOnce(String) -> Fut,
        Fut: Future<Output = GatewayResult<()>>,
    {
        let Some(first) = part_ids.first() else {
            return Err(GatewayError::EmptyGather);
        };
        let locker_id = LockerId::for_gather(first);
        self.store.delete_parts(request_id, part_ids).await?;
        self.try_complete(request_id, &locker_id, on_completed).await
    }

    /// One completion attempt: probe, claim, handler, cleanup.
    ///
    /// The probe skips the claim round-trip in the common case of many
    /// outstanding parts. A lost claim means the scatter flag is unset,
    /// another actor holds the section, or the request no longer exists; all
    /// read as `Pending`.
    async fn try_complete<H, Fut>(
        &self,
        request_id: &RequestId,
        locker_id: &LockerId,
        on_completed: H,
    ) -> GatewayResult<Completion>
    where
        H: FnOnce(String) -> Fut,
        Fut: Future<Output = GatewayResult<()>>,
    {
        if self.store.any_parts_outstanding(request_id).await? {
            return Ok(Completion::Pending);
        }

        let Some(context) = self.store.try_claim_completion(request_id, locker_id).await? else {
            debug!(request_id = %request_id, locker_id = %locker_id, "completion claim lost");
            return Ok(Completion::Pending);
        };
        debug!(request_id = %request_id, locker_id = %locker_id, "completion claim won");

        // A handler failure propagates with the locker left in place, so a
        // retry from the same call site re-enters the critical section.
        on_completed(context.clone()).await?;

        self.wipe(request_id).await?;
        Ok(Completion::Completed { context })
    }

    /// Delete every part row, then the request row.
    ///
    /// Loops because one consistent listing may be a bounded page, and a late
    /// concurrent scatter can re-add parts mid-wipe.
    async fn wipe(&self, request_id: &RequestId) -> GatewayResult<()> {
        loop {
            let parts = self.store.list_parts(request_id).await?;
            if parts.is_empty() {
                break;
            }
            debug!(request_id = %request_id, count = parts.len(), "wiping part rows");
            self.store.delete_parts(request_id, &parts).await?;
        }
        self.store.delete_request(request_id).await
    }
}
