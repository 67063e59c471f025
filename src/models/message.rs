//! Transcript message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The signed-in human.
    User,
    /// The verification agent.
    Bot,
}

/// Content kind attached to a message beyond plain text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text claim or reply.
    Text,
    /// Generic document upload.
    File,
    /// Image upload.
    Image,
    /// Voice recording (transcribed before dispatch).
    Voice,
    /// Structured verified-results summary rendered for the transcript.
    Verified,
}

/// One transcript message persisted inside a chat document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Message {
    /// Unique message identifier.
    pub id: String,
    /// Message body shown in the transcript.
    pub content: String,
    /// Author tag.
    pub sender: Sender,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Content kind; `None` reads as plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    /// Original file name for uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Structured metadata (e.g. verified results attached to a summary).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Message {
    /// Construct a message with a generated id and current timestamp.
    #[must_use]
    pub fn new(content: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
            kind: None,
            file_name: None,
            meta: None,
        }
    }

    /// Builder-style content kind.
    #[must_use]
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Builder-style file name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Builder-style structured metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}
