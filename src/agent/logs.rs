//! Authoritative per-request log buffers.
//!
//! Progress and log frames for an in-flight request accumulate here in
//! arrival order and are merged into the final payload when the request
//! resolves. Buffers are dropped whenever their request leaves the pending
//! table (resolve, reject, timeout, cancel, teardown). The cosmetic
//! thinking feed is a separate projection (see [`crate::agent::live`]) and
//! never reads from or writes to these buffers.

use std::collections::HashMap;

use serde_json::Value;

/// JSON key under which accumulated log lines are attached to a resolved
/// final payload.
pub const MERGED_LOGS_KEY: &str = "agent_logs";

/// Ordered log lines keyed by request id.
#[derive(Debug, Default)]
pub struct LogAggregator {
    buffers: HashMap<String, Vec<String>>,
}

impl LogAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line to the buffer for `request_id`, creating the buffer
    /// lazily on first use.
    pub fn append(&mut self, request_id: &str, line: String) {
        self.buffers.entry(request_id.to_owned()).or_default().push(line);
    }

    /// Lines accumulated so far for `request_id`, in arrival order.
    #[must_use]
    pub fn lines(&self, request_id: &str) -> &[String] {
        self.buffers.get(request_id).map_or(&[], Vec::as_slice)
    }

    /// Remove the buffer for `request_id` and merge its lines into
    /// `payload` under [`MERGED_LOGS_KEY`].
    ///
    /// Non-object payloads are returned untouched (nothing to attach to);
    /// the buffer is still dropped. An absent or empty buffer leaves the
    /// payload unchanged.
    pub fn merge_into(&mut self, request_id: &str, mut payload: Value) -> Value {
        let lines = self.buffers.remove(request_id).unwrap_or_default();
        if lines.is_empty() {
            return payload;
        }

        if let Some(object) = payload.as_object_mut() {
            object.insert(
                MERGED_LOGS_KEY.into(),
                Value::Array(lines.into_iter().map(Value::String).collect()),
            );
        }
        payload
    }

    /// Drop the buffer for `request_id` without merging (reject paths).
    pub fn discard(&mut self, request_id: &str) {
        self.buffers.remove(request_id);
    }

    /// Drop every buffer (deliberate teardown).
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
