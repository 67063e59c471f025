//! Verification wire shapes and result rendering.
//!
//! The outbound payload carries the agent's top-level input fields; the
//! request id is injected by the dispatcher just before transmission. The
//! response is kept as loose JSON (the agent's result schema varies per
//! node) with typed accessors for the fields the client reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::logs::MERGED_LOGS_KEY;
use crate::models::message::{Message, Sender};

/// Type tag the agent expects on streaming invocations.
pub const INVOKE_TYPE: &str = "invoke_agent";

/// One uploaded image referenced by the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ImageMapping {
    /// Original file name.
    pub filename: String,
    /// Public URL returned by the upload endpoint.
    pub url: String,
}

/// One prior transcript turn in the role/content shape the agent expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HistoryTurn {
    /// `user`, `assistant`, or `system`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

impl From<&Message> for HistoryTurn {
    fn from(message: &Message) -> Self {
        let role = match message.sender {
            Sender::Bot => "assistant",
            Sender::User => "user",
        };
        Self {
            role: role.into(),
            content: message.content.clone(),
        }
    }
}

/// Outbound verification request payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct VerifyRequest {
    /// Signed-in user id.
    pub user_id: String,
    /// Conversation id, empty for a not-yet-persisted chat.
    pub chat_id: String,
    /// Uploaded images referenced by this query.
    pub image_mappings: Vec<ImageMapping>,
    /// Previously verified results carried forward.
    pub verified_results: Vec<Value>,
    /// Prior transcript turns.
    pub chat_history: Vec<HistoryTurn>,
    /// The new claim or question to verify.
    pub new_query: String,
    /// Public URLs of images attached to the new query.
    pub new_image_paths: Vec<String>,
    /// Invocation type tag (always [`INVOKE_TYPE`] on the socket path).
    #[serde(rename = "type")]
    pub invoke_type: String,
}

impl VerifyRequest {
    /// Build a request from the current transcript and new query.
    #[must_use]
    pub fn from_transcript(
        user_id: String,
        chat_id: String,
        history: &[Message],
        new_query: String,
        image_url: Option<String>,
    ) -> Self {
        let image_mappings = image_url
            .as_deref()
            .map(|url| ImageMapping {
                filename: url.rsplit('/').next().unwrap_or_default().to_owned(),
                url: url.to_owned(),
            })
            .into_iter()
            .collect();

        Self {
            user_id,
            chat_id,
            image_mappings,
            verified_results: Vec::new(),
            chat_history: history.iter().map(HistoryTurn::from).collect(),
            new_query,
            new_image_paths: image_url.into_iter().collect(),
            invoke_type: INVOKE_TYPE.into(),
        }
    }
}

/// Loose view over the agent's response body.
#[derive(Debug, Clone)]
pub struct VerifyResponse(pub Value);

impl VerifyResponse {
    /// The agent's conversational answer, or a pretty-printed dump of the
    /// whole body when the expected field is missing.
    #[must_use]
    pub fn agent_response(&self) -> String {
        match self.0.get("agent_response").and_then(Value::as_str) {
            Some(text) => text.to_owned(),
            None => serde_json::to_string_pretty(&self.0).unwrap_or_default(),
        }
    }

    /// Structured verified results, when present and non-empty.
    #[must_use]
    pub fn verified_results(&self) -> Option<&Vec<Value>> {
        self.0
            .get("verified_results")
            .and_then(Value::as_array)
            .filter(|results| !results.is_empty())
    }

    /// Progress log lines merged in by the correlation layer.
    #[must_use]
    pub fn agent_logs(&self) -> Vec<&str> {
        self.0
            .get(MERGED_LOGS_KEY)
            .and_then(Value::as_array)
            .map(|lines| lines.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Render verified results as plain text for the transcript: claims with
/// classification and sources, grounded summaries, and citations.
#[must_use]
pub fn render_verified_results(verified_results: &[Value]) -> String {
    let mut parts: Vec<String> = vec!["Verified results:".into()];

    for result in verified_results {
        if let Some(claims) = result
            .get("newly_verified_text_claims")
            .and_then(Value::as_array)
        {
            for claim in claims {
                render_claim(claim, result, &mut parts);
            }
        }

        let summary = result
            .get("grounded_ai_summary")
            .or_else(|| result.get("grounded_summary"))
            .and_then(Value::as_str);
        if let Some(summary) = summary {
            parts.push(format!("\nGrounded summary: {summary}"));
        }

        let citations = result
            .get("grounded_citations")
            .or_else(|| result.get("citations"))
            .and_then(Value::as_array);
        if let Some(citations) = citations.filter(|c| !c.is_empty()) {
            parts.push("\nCitations:".into());
            for citation in citations {
                let title = citation
                    .get("title")
                    .or_else(|| citation.get("publisher"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let url = citation
                    .get("url")
                    .and_then(Value::as_str)
                    .map_or_else(|| citation.to_string(), str::to_owned);
                parts.push(format!("  - {title}: {url}"));
            }
        }
    }

    parts.join("\n")
}

/// Render one verified claim with its classification and evidence sources.
fn render_claim(claim: &Value, result: &Value, parts: &mut Vec<String>) {
    let text = claim.get("claim").and_then(Value::as_str).unwrap_or_default();
    parts.push(format!("\n- Claim: {text}"));

    let classification = claim
        .get("classification")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let confidence = claim
        .get("confidence")
        .map_or_else(|| "n/a".to_owned(), Value::to_string);
    parts.push(format!(
        "  Classification: {classification} (confidence: {confidence})"
    ));

    if let Some(justification) = claim.get("justification").and_then(Value::as_str) {
        parts.push(format!("  Justification: {justification}"));
    }

    // Evidence may hang off the claim or the surrounding result.
    let evidence = claim
        .get("evidence")
        .and_then(Value::as_array)
        .or_else(|| {
            result
                .get("evidence")
                .and_then(|e| e.get("official_fact_checks"))
                .and_then(Value::as_array)
        });
    if let Some(sources) = evidence.filter(|s| !s.is_empty()) {
        parts.push("  Sources:".into());
        for source in sources {
            let publisher = source.get("publisher").and_then(Value::as_str);
            let url = source.get("url").and_then(Value::as_str);
            match (publisher, url) {
                (Some(publisher), Some(url)) => parts.push(format!("    - {publisher}: {url}")),
                (Some(publisher), None) => parts.push(format!("    - {publisher}")),
                (None, Some(url)) => parts.push(format!("    - {url}")),
                (None, None) => parts.push(format!("    - {source}")),
            }
        }
    }
}
