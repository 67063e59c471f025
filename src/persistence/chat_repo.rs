//! Chat repository: conversation documents keyed by owner.
//!
//! Messages are stored as one JSON column per chat; updates are always a
//! full replace of the transcript, matching the document-store contract the
//! surrounding UI was written against. Mutations fan out on a broadcast
//! change feed so listeners can re-query their owner's chats, standing in
//! for the document store's native real-time subscription.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tokio::sync::broadcast;

use crate::models::chat::{derive_title, Chat};
use crate::models::message::Message;
use crate::{AppError, Result};

use super::db::Database;

const CHANGE_FEED_CAPACITY: usize = 64;

/// Change notification: the owner whose chat list changed.
#[derive(Debug, Clone)]
pub struct ChatChange {
    /// Owner user id of the mutated chat.
    pub user_id: String,
}

/// Repository wrapper around `SQLite` for chat documents.
#[derive(Clone)]
pub struct ChatRepo {
    db: Database,
    changes: broadcast::Sender<ChatChange>,
}

impl ChatRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { db, changes }
    }

    /// Subscribe to chat-list change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChatChange> {
        self.changes.subscribe()
    }

    /// Insert a new chat, optionally seeded with a first message, and
    /// return its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, user_id: &str, first_message: Option<Message>) -> Result<String> {
        let chat = Chat::new(user_id.to_owned(), first_message);
        let messages = serde_json::to_string(&chat.messages)
            .map_err(|err| AppError::Db(format!("failed to encode messages: {err}")))?;

        sqlx::query(
            "INSERT INTO chats (id, user_id, title, messages, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chat.id)
        .bind(&chat.user_id)
        .bind(&chat.title)
        .bind(&messages)
        .bind(chat.created_at.to_rfc3339())
        .bind(chat.updated_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        self.notify(user_id);
        Ok(chat.id)
    }

    /// Full-replace the message list of an existing chat.
    ///
    /// Also refreshes the derived title and the `updated_at` timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the chat does not exist or the update fails.
    pub async fn update_messages(&self, chat_id: &str, messages: &[Message]) -> Result<()> {
        let title = derive_title(messages);
        let encoded = serde_json::to_string(messages)
            .map_err(|err| AppError::Db(format!("failed to encode messages: {err}")))?;

        let result = sqlx::query(
            "UPDATE chats SET messages = ?, title = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&encoded)
        .bind(&title)
        .bind(Utc::now().to_rfc3339())
        .bind(chat_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Db(format!("chat not found: {chat_id}")));
        }

        if let Ok(chat) = self.get(chat_id).await {
            self.notify(&chat.user_id);
        }
        Ok(())
    }

    /// Point read of one chat document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the chat does not exist or the read fails.
    pub async fn get(&self, chat_id: &str) -> Result<Chat> {
        let row = sqlx::query(
            "SELECT id, user_id, title, messages, created_at, updated_at
             FROM chats WHERE id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Db(format!("chat not found: {chat_id}")))?;

        row_to_chat(&row)
    }

    /// All chats owned by `user_id`, newest activity first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, messages, created_at, updated_at
             FROM chats WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(row_to_chat).collect()
    }

    /// Delete one chat document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, chat_id: &str) -> Result<()> {
        let owner = self.get(chat_id).await.map(|chat| chat.user_id).ok();

        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(chat_id)
            .execute(&self.db)
            .await?;

        if let Some(user_id) = owner {
            self.notify(&user_id);
        }
        Ok(())
    }

    /// Rename one chat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the chat does not exist or the update fails.
    pub async fn update_title(&self, chat_id: &str, title: &str) -> Result<()> {
        let result = sqlx::query("UPDATE chats SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(Utc::now().to_rfc3339())
            .bind(chat_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Db(format!("chat not found: {chat_id}")));
        }

        if let Ok(chat) = self.get(chat_id).await {
            self.notify(&chat.user_id);
        }
        Ok(())
    }

    fn notify(&self, user_id: &str) {
        // No listeners is fine; the feed is best-effort.
        let _ = self.changes.send(ChatChange {
            user_id: user_id.to_owned(),
        });
    }
}

/// Decode one database row into a [`Chat`].
fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> Result<Chat> {
    let messages_json: String = row.try_get("messages")?;
    let messages: Vec<Message> = serde_json::from_str(&messages_json)
        .map_err(|err| AppError::Db(format!("corrupt messages column: {err}")))?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Chat {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        messages,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| AppError::Db(format!("corrupt timestamp column: {err}")))
}
