//! In-process coordination store used by the protocol tests.
//!
//! Linearizable by construction: every operation runs under one mutex, so
//! the conditional claim is a single atomic step exactly as the port
//! requires, and reads always observe the latest writes.

use async_trait::async_trait;
use muster_core::{LockerId, PartId, RequestId, RequestRecord};
use muster_gateway::{CoordinationStore, GatewayResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct RequestRow {
    context: String,
    scatter_completed: bool,
    locker_id: Option<String>,
}

#[derive(Default)]
struct State {
    requests: HashMap<String, RequestRow>,
    parts: BTreeSet<(String, String)>,
}

pub struct MemoryStore {
    state: Mutex<State>,
    /// Largest page `list_parts` returns, to exercise the cleanup loop.
    list_limit: usize,
    claim_attempts: AtomicUsize,
    claims_won: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Self::with_list_limit(usize::MAX)
    }

    pub fn with_list_limit(list_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            list_limit,
            claim_attempts: AtomicUsize::new(0),
            claims_won: AtomicUsize::new(0),
        })
    }

    pub fn claim_attempts(&self) -> usize {
        self.claim_attempts.load(Ordering::SeqCst)
    }

    pub fn claims_won(&self) -> usize {
        self.claims_won.load(Ordering::SeqCst)
    }

    pub fn request_exists(&self, request_id: &str) -> bool {
        self.state.lock().unwrap().requests.contains_key(request_id)
    }

    pub fn locker_of(&self, request_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .requests
            .get(request_id)
            .and_then(|row| row.locker_id.clone())
    }

    pub fn part_count(&self, request_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .parts
            .iter()
            .filter(|(request, _)| request == request_id)
            .count()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn put_request(&self, record: &RequestRecord) -> GatewayResult<()> {
        self.state.lock().unwrap().requests.insert(
            record.request_id.as_str().to_string(),
            RequestRow {
                context: record.context.clone(),
                scatter_completed: false,
                locker_id: None,
            },
        );
        Ok(())
    }

    async fn mark_scatter_completed(&self, request_id: &RequestId) -> GatewayResult<()> {
        if let Some(row) = self
            .state
            .lock()
            .unwrap()
            .requests
            .get_mut(request_id.as_str())
        {
            row.scatter_completed = true;
        }
        Ok(())
    }

    async fn try_claim_completion(
        &self,
        request_id: &RequestId,
        locker_id: &LockerId,
    ) -> GatewayResult<Option<String>> {
        self.claim_attempts.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        let Some(row) = state.requests.get_mut(request_id.as_str()) else {
            return Ok(None);
        };
        if !row.scatter_completed {
            return Ok(None);
        }
        match &row.locker_id {
            Some(held) if held.as_str() != locker_id.as_str() => return Ok(None),
            Some(_) => {}
            None => {
                row.locker_id = Some(locker_id.as_str().to_string());
                self.claims_won.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(Some(row.context.clone()))
    }

    async fn delete_request(&self, request_id: &RequestId) -> GatewayResult<()> {
        self.state
            .lock()
            .unwrap()
            .requests
            .remove(request_id.as_str());
        Ok(())
    }

    async fn put_parts(&self, request_id: &RequestId, part_ids: &[PartId]) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        for part_id in part_ids {
            state.parts.insert((
                request_id.as_str().to_string(),
                part_id.as_str().to_string(),
            ));
        }
        Ok(())
    }

    async fn delete_parts(&self, request_id: &RequestId, part_ids: &[PartId]) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        for part_id in part_ids {
            state
                .parts
                .remove(&(request_id.as_str().to_string(), part_id.as_str().to_string()));
        }
        Ok(())
    }

    async fn any_parts_outstanding(&self, request_id: &RequestId) -> GatewayResult<bool> {
        Ok(self.part_count(request_id.as_str()) > 0)
    }

    async fn list_parts(&self, request_id: &RequestId) -> GatewayResult<Vec<PartId>> {
        let state = self.state.lock().unwrap();
        state
            .parts
            .iter()
            .filter(|(request, _)| request == request_id.as_str())
            .take(self.list_limit)
            .map(|(_, part)| PartId::parse(part.clone()).map_err(Into::into))
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
