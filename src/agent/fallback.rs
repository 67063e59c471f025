//! Non-streaming HTTP fallback for agent invocation.
//!
//! Used when the duplex socket is unavailable or a dispatch attempt fails.
//! One POST, one response, no correlation table. Failures surface as a
//! small fixed set of user-facing messages rather than raw status codes.

use serde_json::Value;
use tracing::debug;

use crate::{AppError, Result};

/// User-facing message for 5xx service failures.
const SERVICE_ISSUES: &str =
    "The verification service is currently experiencing issues. Please try again in a few moments.";

/// User-facing message for rate limiting.
const RATE_LIMITED: &str = "Too many requests. Please wait a moment before trying again.";

/// Single-shot fallback client for the verification endpoint.
#[derive(Debug, Clone)]
pub struct FallbackTransport {
    client: reqwest::Client,
    verify_url: String,
}

impl FallbackTransport {
    /// Create a fallback transport for the given verification endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client, verify_url: String) -> Self {
        Self { client, verify_url }
    }

    /// POST the payload and return the parsed JSON body verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Fallback`] with a classified, user-facing
    /// message: service issues (500), rate limited (429), a generic server
    /// error for other non-success statuses, or a transport/parse failure.
    pub async fn verify(&self, payload: &Value) -> Result<Value> {
        debug!(url = %self.verify_url, "invoking verification over HTTP fallback");

        let response = self
            .client
            .post(&self.verify_url)
            .json(payload)
            .send()
            .await
            .map_err(|err| AppError::Fallback(format!("could not reach the service: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| AppError::Fallback(format!("unreadable service response: {err}")))
    }
}

/// Map a non-success HTTP status to its classified outcome.
fn classify_status(status: u16) -> AppError {
    match status {
        500 => AppError::Fallback(SERVICE_ISSUES.into()),
        429 => AppError::Fallback(RATE_LIMITED.into()),
        other => AppError::Fallback(format!("Server error ({other}). Please try again later.")),
    }
}
