//! Chat session service.
//!
//! Owns one conversation: the in-memory transcript, the streaming agent
//! connection, the HTTP fallback, the media collaborators, and the
//! persisted chat document. The session prefers the socket path for every
//! verification and falls back to the single-shot HTTP call when the
//! socket is unavailable or the dispatch fails; every rejection is caught
//! and rendered as a degraded-service transcript message; a failed
//! verification never tears the session down.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::agent::{AgentConnection, FallbackTransport};
use crate::identity::IdentityProvider;
use crate::media::{TranscribeClient, UploadClient};
use crate::models::message::{Message, MessageKind, Sender};
use crate::models::verify::{render_verified_results, VerifyRequest, VerifyResponse};
use crate::persistence::ChatRepo;
use crate::{AppError, Result};

/// Greeting seeded into every new transcript.
pub const WELCOME_MESSAGE: &str = "Hello! I'm TrueLens AI. I can help you verify news, articles, \
     images, or any content for misinformation. How can I assist you today?";

/// Degraded-service reply when both transports fail.
const DEGRADED_MESSAGE: &str =
    "I apologize, but I'm having trouble processing your request. Please try again or rephrase \
     your question.";

/// One user-visible conversation bound to a signed-in identity.
pub struct ChatSession {
    connection: AgentConnection,
    fallback: FallbackTransport,
    upload: Option<UploadClient>,
    transcribe: Option<TranscribeClient>,
    repo: ChatRepo,
    identity: Arc<dyn IdentityProvider>,
    chat_id: Option<String>,
    messages: Vec<Message>,
}

impl ChatSession {
    /// Start a fresh session seeded with the welcome message.
    #[must_use]
    pub fn new(
        connection: AgentConnection,
        fallback: FallbackTransport,
        upload: Option<UploadClient>,
        transcribe: Option<TranscribeClient>,
        repo: ChatRepo,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            connection,
            fallback,
            upload,
            transcribe,
            repo,
            identity,
            chat_id: None,
            messages: vec![Message::new(WELCOME_MESSAGE, Sender::Bot)],
        }
    }

    /// Resume a persisted chat if it exists and belongs to the signed-in
    /// user; otherwise keep the fresh transcript.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` when no user is signed in.
    pub async fn resume(&mut self, chat_id: &str) -> Result<()> {
        let user = self.require_identity()?;

        match self.repo.get(chat_id).await {
            Ok(chat) if chat.user_id == user.uid => {
                if !chat.messages.is_empty() {
                    self.messages = chat.messages;
                }
                self.chat_id = Some(chat.id);
            }
            Ok(_) | Err(_) => {
                // Missing or foreign chat: start over, as the UI does.
                warn!(chat_id, "chat unavailable for this user; starting a new one");
                self.chat_id = None;
            }
        }
        Ok(())
    }

    /// Current transcript, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Id of the persisted chat document, once the first exchange is saved.
    #[must_use]
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    /// Submit a text claim for verification.
    ///
    /// Appends the user message, runs the verification (socket first, HTTP
    /// fallback second), appends the bot reply plus an optional
    /// verified-results summary, and persists the transcript. The returned
    /// slice covers the messages appended by this exchange.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` when no user is signed in. Transport
    /// failures do not error; they surface as transcript messages.
    pub async fn send_text(&mut self, content: &str) -> Result<&[Message]> {
        self.exchange(content, MessageKind::Text, None, None).await
    }

    /// Submit an image with accompanying text.
    ///
    /// The bytes are uploaded first; the returned public URL is threaded
    /// into the verification payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` when no user is signed in, or
    /// `AppError::Upload` when no upload endpoint is configured.
    pub async fn send_image(
        &mut self,
        content: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<&[Message]> {
        let upload = self
            .upload
            .as_ref()
            .ok_or_else(|| AppError::Upload("no upload endpoint configured".into()))?;

        match upload.upload(file_name, bytes).await {
            Ok(image_url) => {
                info!(file_name, image_url, "image uploaded");
                self.exchange(content, MessageKind::Image, Some(file_name), Some(image_url))
                    .await
            }
            Err(err) => {
                warn!(%err, "image upload failed");
                self.push_user(content, MessageKind::Image, Some(file_name));
                self.push_bot(
                    "I couldn't upload the image or contact the verification service. \
                     Please try again.",
                );
                self.persist().await;
                Ok(self.tail(2))
            }
        }
    }

    /// Submit a voice recording (base64 data URI); the recording is
    /// transcribed and the transcript verified as text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Identity` when no user is signed in,
    /// `AppError::Transcribe` when no transcription endpoint is configured
    /// or the transcription fails.
    pub async fn send_voice(&mut self, audio_data_uri: &str) -> Result<&[Message]> {
        let transcribe = self
            .transcribe
            .as_ref()
            .ok_or_else(|| AppError::Transcribe("no transcription endpoint configured".into()))?;

        let transcript = transcribe.transcribe(audio_data_uri).await?;
        self.exchange(&transcript, MessageKind::Voice, None, None).await
    }

    /// Tear down the agent connection.
    pub async fn close(&self) {
        self.connection.shutdown().await;
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// One full user↔agent exchange, ending with persistence.
    async fn exchange(
        &mut self,
        content: &str,
        kind: MessageKind,
        file_name: Option<&str>,
        image_url: Option<String>,
    ) -> Result<&[Message]> {
        let user = self.require_identity()?;

        self.push_user(content, kind, file_name);
        let mut appended = 1usize;

        let request = VerifyRequest::from_transcript(
            user.uid,
            self.chat_id.clone().unwrap_or_default(),
            // History excludes the message just pushed; it rides in new_query.
            &self.messages[..self.messages.len() - 1],
            content.to_owned(),
            image_url,
        );

        match self.invoke(&request).await {
            Ok(response) => {
                self.push_bot(response.agent_response());
                appended += 1;

                if let Some(results) = response.verified_results() {
                    let summary = render_verified_results(results);
                    let meta = Value::Array(results.clone());
                    self.messages.push(
                        Message::new(summary, Sender::Bot)
                            .with_kind(MessageKind::Verified)
                            .with_meta(meta),
                    );
                    appended += 1;
                }
            }
            Err(AppError::Fallback(message)) => {
                // Classified, already user-facing.
                self.push_bot(message);
                appended += 1;
            }
            Err(err) => {
                warn!(%err, "verification failed on both transports");
                self.push_bot(DEGRADED_MESSAGE);
                appended += 1;
            }
        }

        self.persist().await;
        Ok(self.tail(appended))
    }

    /// Socket-first invocation with HTTP fallback.
    async fn invoke(&self, request: &VerifyRequest) -> Result<VerifyResponse> {
        let payload = serde_json::to_value(request)?;

        match self.connection.dispatch(payload.clone()).await {
            Ok(body) => Ok(VerifyResponse(body)),
            Err(err) => {
                warn!(%err, "socket dispatch failed, falling back to HTTP");
                let body = self.fallback.verify(&payload).await?;
                Ok(VerifyResponse(body))
            }
        }
    }

    fn require_identity(&self) -> Result<crate::identity::UserIdentity> {
        self.identity
            .current()
            .ok_or_else(|| AppError::Identity("no user is signed in".into()))
    }

    fn push_user(&mut self, content: &str, kind: MessageKind, file_name: Option<&str>) {
        let mut message = Message::new(content, Sender::User).with_kind(kind);
        if let Some(file_name) = file_name {
            message = message.with_file_name(file_name);
        }
        self.messages.push(message);
    }

    fn push_bot(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(content, Sender::Bot));
    }

    /// Last `count` messages of the transcript.
    fn tail(&self, count: usize) -> &[Message] {
        &self.messages[self.messages.len().saturating_sub(count)..]
    }

    /// Persist the transcript: create on first real exchange, then
    /// full-replace updates. Persistence failures are logged, never fatal
    /// to the conversation.
    async fn persist(&mut self) {
        let Some(user) = self.identity.current() else {
            return;
        };
        // Nothing beyond the welcome message yet.
        if self.messages.len() <= 1 {
            return;
        }

        if let Some(chat_id) = self.chat_id.clone() {
            if let Err(err) = self.repo.update_messages(&chat_id, &self.messages).await {
                warn!(%err, chat_id, "failed to update chat");
            }
            return;
        }

        let first_real = self.messages.get(1).or_else(|| self.messages.first()).cloned();
        match self.repo.create(&user.uid, first_real).await {
            Ok(chat_id) => {
                if let Err(err) = self.repo.update_messages(&chat_id, &self.messages).await {
                    warn!(%err, chat_id, "failed to save new chat transcript");
                }
                self.chat_id = Some(chat_id);
            }
            Err(err) => warn!(%err, "failed to create chat"),
        }
    }
}
