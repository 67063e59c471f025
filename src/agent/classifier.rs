//! Frame classification: decide what one inbound frame does.
//!
//! The decision is a pure function of the frame and the current pending
//! table, evaluated in a fixed order with first-match-wins semantics. The
//! side effects a disposition permits are strictly: diagnostic emission,
//! one log-buffer append, or exactly one pending-request resolution.

use serde_json::Value;

use crate::agent::frame::InboundFrame;
use crate::agent::pending::PendingTable;

/// Tags that mark a frame as progress for a matched in-flight request.
const PROGRESS_TAGS: [&str; 6] = [
    "log",
    "node_start",
    "node_end",
    "agent",
    "state_update",
    "node_output",
];

/// Lifecycle-only tags emitted by the agent between requests.
const LIFECYCLE_TAGS: [&str; 5] = [
    "agent_start",
    "agent_progress",
    "node_start",
    "node_end",
    "agent",
];

/// Terminal tag announcing a final answer.
const FINISH_TAG: &str = "agent_finish";

/// What the connection actor should do with one classified frame.
#[derive(Debug)]
pub enum Disposition {
    /// Append a progress line to the matched request's log buffer.
    AppendLog {
        /// Matched request id.
        request_id: String,
        /// Line to append, in arrival order.
        line: String,
    },
    /// Resolve the matched request with `payload` (logs merged by the actor).
    Resolve {
        /// Matched request id.
        request_id: String,
        /// Final payload delivered to the caller.
        payload: Value,
    },
    /// Best-effort: resolve the oldest outstanding request with `payload`.
    ResolveOldest {
        /// Final payload delivered to the caller.
        payload: Value,
    },
    /// Id-less log line: append to the oldest outstanding buffer if any,
    /// and emit to diagnostics with the given severity.
    StrayLog {
        /// Line to append/emit.
        line: String,
        /// Whether the `type` sub-field marked this line as an error.
        is_error: bool,
    },
    /// Informational only: emit to local diagnostics and move on.
    Diagnostics {
        /// Short label describing why the frame was unrouted.
        reason: &'static str,
    },
}

/// Classify one parsed frame against the pending table.
///
/// `node_output` serves as both a progress and a terminal tag in the agent
/// protocol; the deterministic rule here is that it resolves the request
/// only when the frame carries a nested `final_output` payload, and is
/// log-only otherwise.
#[must_use]
pub fn classify(frame: &InboundFrame, pending: &PendingTable) -> Disposition {
    let tag = frame.event_tag();

    // A frame whose id matches an in-flight request either logs against it
    // or resolves it.
    if let Some(request_id) = frame.request_id.as_deref() {
        if pending.contains(request_id) {
            let is_progress = PROGRESS_TAGS.contains(&tag);
            let is_terminal = tag == FINISH_TAG
                || (tag == "node_output" && frame.final_output.is_some())
                || !is_progress;

            if is_terminal {
                return Disposition::Resolve {
                    request_id: request_id.to_owned(),
                    payload: frame.raw.clone(),
                };
            }

            return Disposition::AppendLog {
                request_id: request_id.to_owned(),
                line: frame.log_line(),
            };
        }
    }

    // Id-less final answer: match the oldest outstanding request.
    if frame.request_id.is_none() && tag == FINISH_TAG && !pending.is_empty() {
        let payload = frame
            .final_output
            .clone()
            .unwrap_or_else(|| frame.raw.clone());
        return Disposition::ResolveOldest { payload };
    }

    if tag == "log" {
        let is_error = frame.log_type.as_deref() == Some("error");
        return Disposition::StrayLog {
            line: frame.log_line(),
            is_error,
        };
    }

    if LIFECYCLE_TAGS.contains(&tag) {
        return Disposition::Diagnostics {
            reason: "lifecycle event",
        };
    }

    if tag == "error" {
        // Policy: top-level error events never fail a pending request.
        return Disposition::Diagnostics {
            reason: "agent error event",
        };
    }

    Disposition::Diagnostics {
        reason: "unrecognized event",
    }
}
