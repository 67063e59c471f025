//! Insertion-ordered table of in-flight requests.
//!
//! Owned exclusively by the connection actor; every mutation happens on that
//! one task. Each entry pairs the caller's `oneshot` resolver with the
//! expiry-queue key for its deadline so the timer can be cancelled on any
//! non-timeout resolution path.

use std::collections::HashMap;
use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::time::delay_queue;

use crate::Result;

/// One in-flight request awaiting its terminal frame.
#[derive(Debug)]
pub struct PendingRequest {
    /// Resolves the caller's dispatch future, success or failure.
    pub resolver: oneshot::Sender<Result<Value>>,
    /// Key of the deadline entry in the actor's expiry queue.
    pub expiry_key: delay_queue::Key,
    /// When the request was dispatched.
    pub started_at: Instant,
}

/// Pending-request table with deterministic oldest-first lookup.
///
/// A `HashMap` keyed by request id carries the entries; a queue of ids in
/// insertion order backs the best-effort "oldest outstanding" fallback for
/// id-less terminal frames. Removal is idempotent: taking an id twice
/// returns `None` the second time, so at most one of resolve/reject can
/// ever fire per request.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<String, PendingRequest>,
    order: VecDeque<String>,
}

impl PendingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no requests are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `request_id` is outstanding.
    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        self.entries.contains_key(request_id)
    }

    /// Register a new in-flight request.
    ///
    /// The caller guarantees id uniqueness (generated ids carry a random
    /// suffix); re-inserting an id replaces the stale entry, which then can
    /// never resolve; its order slot is skipped on lookup.
    pub fn insert(&mut self, request_id: String, entry: PendingRequest) {
        self.order.push_back(request_id.clone());
        self.entries.insert(request_id, entry);
    }

    /// Remove and return the entry for `request_id`, if still outstanding.
    pub fn take(&mut self, request_id: &str) -> Option<PendingRequest> {
        let entry = self.entries.remove(request_id)?;
        self.order.retain(|id| id != request_id);
        Some(entry)
    }

    /// Id of the oldest outstanding request, without removing it.
    #[must_use]
    pub fn oldest_id(&self) -> Option<&str> {
        self.order
            .iter()
            .find(|id| self.entries.contains_key(*id))
            .map(String::as_str)
    }

    /// Remove and return the oldest outstanding request by insertion order.
    ///
    /// Best-effort heuristic for terminal frames that arrive without a
    /// request id, not a protocol guarantee.
    pub fn take_oldest(&mut self) -> Option<(String, PendingRequest)> {
        while let Some(id) = self.order.pop_front() {
            if let Some(entry) = self.entries.remove(&id) {
                return Some((id, entry));
            }
        }
        None
    }

    /// Drain every outstanding entry, oldest first, for teardown.
    pub fn drain(&mut self) -> Vec<(String, PendingRequest)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some((id, entry)) = self.take_oldest() {
            drained.push((id, entry));
        }
        self.order.clear();
        drained
    }
}
