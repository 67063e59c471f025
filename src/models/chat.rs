//! Chat document model and title derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::{Message, Sender};

/// Maximum title length before truncation with an ellipsis.
const TITLE_MAX_CHARS: usize = 50;

/// Fallback title for chats with no user message yet.
const DEFAULT_TITLE: &str = "New Chat";

/// One persisted conversation: an ordered transcript owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Chat {
    /// Opaque document identifier.
    pub id: String,
    /// Owning user id; immutable after creation.
    pub user_id: String,
    /// Short title derived from the first user message.
    pub title: String,
    /// Ordered transcript.
    pub messages: Vec<Message>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-updated timestamp; owner listings sort on this, descending.
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Construct a new chat, optionally seeded with a first message.
    #[must_use]
    pub fn new(user_id: String, first_message: Option<Message>) -> Self {
        let messages: Vec<Message> = first_message.into_iter().collect();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            title: derive_title(&messages),
            messages,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Title for a transcript: the first user message truncated to
/// [`TITLE_MAX_CHARS`] characters with a trailing ellipsis, or
/// [`DEFAULT_TITLE`] when no user message exists.
#[must_use]
pub fn derive_title(messages: &[Message]) -> String {
    let Some(first_user) = messages.iter().find(|m| m.sender == Sender::User) else {
        return DEFAULT_TITLE.into();
    };

    let content = first_user.content.trim();
    if content.is_empty() {
        return DEFAULT_TITLE.into();
    }

    if content.chars().count() <= TITLE_MAX_CHARS {
        content.into()
    } else {
        let truncated: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{truncated}...")
    }
}
