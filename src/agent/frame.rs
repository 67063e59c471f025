//! Inbound frame parsing and outbound request-id injection.
//!
//! One frame is one WebSocket text message carrying a JSON object. The
//! request-id field name is a private contract with the remote agent: we
//! write `request_id` and accept `request_id`, `requestId`, or `id` when
//! reading it back, since different agent nodes echo different spellings.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{AppError, Result};

/// Canonical request-id key injected into outbound payloads.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Accepted request-id spellings on inbound frames, checked in order.
const REQUEST_ID_ALIASES: [&str; 3] = ["request_id", "requestId", "id"];

/// A parsed inbound frame from the agent socket.
///
/// Transient: classified and routed, never stored.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Correlation id echoed by the agent, if any.
    pub request_id: Option<String>,
    /// Free-form event tag (`log`, `node_start`, `agent_finish`, …).
    pub event: Option<String>,
    /// Log severity sub-field (`error` vs informational).
    pub log_type: Option<String>,
    /// Human-readable log line, when present.
    pub message: Option<String>,
    /// Nested final-result payload, when present.
    pub final_output: Option<Value>,
    /// The whole decoded frame, used when resolving a caller.
    pub raw: Value,
}

impl InboundFrame {
    /// Parse one raw text frame into an [`InboundFrame`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the text is not a JSON object.
    /// Malformed frames are dropped by the caller, never surfaced to any
    /// pending request.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(text)
            .map_err(|err| AppError::Protocol(format!("malformed frame: {err}")))?;

        if !raw.is_object() {
            return Err(AppError::Protocol("frame is not a JSON object".into()));
        }

        let request_id = REQUEST_ID_ALIASES
            .iter()
            .find_map(|key| raw.get(key).and_then(Value::as_str))
            .map(str::to_owned);

        let field_str =
            |key: &str| -> Option<String> { raw.get(key).and_then(Value::as_str).map(str::to_owned) };

        Ok(Self {
            request_id,
            event: field_str("event"),
            log_type: field_str("type"),
            message: field_str("message"),
            final_output: raw.get("final_output").cloned(),
            raw,
        })
    }

    /// Event tag as a `&str`, empty when absent.
    #[must_use]
    pub fn event_tag(&self) -> &str {
        self.event.as_deref().unwrap_or("")
    }

    /// Text used for log lines: the `message` field when present, otherwise
    /// the whole frame rendered compactly.
    #[must_use]
    pub fn log_line(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => self.raw.to_string(),
        }
    }
}

/// Generate a fresh request id: unix-millis timestamp plus a short random
/// suffix so overlapping dispatches in the same millisecond cannot collide.
#[must_use]
pub fn generate_request_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..12])
}

/// Ensure `payload` carries a request id under [`REQUEST_ID_KEY`], injecting
/// a generated one when absent, and return the effective id.
///
/// # Errors
///
/// Returns [`AppError::Transmit`] when the payload is not a JSON object and
/// therefore cannot carry a correlation id.
pub fn ensure_request_id(payload: &mut Value) -> Result<String> {
    let Some(object) = payload.as_object_mut() else {
        return Err(AppError::Transmit(
            "dispatch payload must be a JSON object".into(),
        ));
    };

    if let Some(existing) = object.get(REQUEST_ID_KEY).and_then(Value::as_str) {
        return Ok(existing.to_owned());
    }

    let id = generate_request_id();
    object.insert(REQUEST_ID_KEY.into(), Value::String(id.clone()));
    Ok(id)
}
