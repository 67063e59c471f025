//! Speech-to-text client.
//!
//! Prefers a multipart upload of the decoded recording to
//! `/transcribe-file`; when the audio cannot be decoded or the multipart
//! path fails, falls back to a JSON POST of the base64 data URI to
//! `/transcribe`, which the server decodes itself.

use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Response body from either transcription endpoint.
#[derive(Debug, Deserialize)]
struct TranscribeReply {
    transcript: String,
}

/// A decoded `data:` URI: media type plus raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// MIME type (e.g. `audio/webm;codecs=opus`).
    pub mime: String,
    /// Decoded payload.
    pub bytes: Vec<u8>,
}

/// Parse a `data:<mime>;base64,<payload>` URI.
///
/// # Errors
///
/// Returns `AppError::Transcribe` when the URI shape or base64 payload is
/// invalid.
pub fn parse_data_uri(uri: &str) -> Result<DataUri> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AppError::Transcribe("not a data URI".into()))?;

    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| AppError::Transcribe("data URI is not base64-encoded".into()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|err| AppError::Transcribe(format!("invalid base64 payload: {err}")))?;

    Ok(DataUri {
        mime: mime.to_owned(),
        bytes,
    })
}

/// Client for the speech-to-text endpoints.
#[derive(Debug, Clone)]
pub struct TranscribeClient {
    client: reqwest::Client,
    base_url: String,
}

impl TranscribeClient {
    /// Create a transcription client for the given endpoint base.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Transcribe a base64 data-URI recording into text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transcribe` when both the multipart and JSON
    /// paths fail.
    pub async fn transcribe(&self, audio_data_uri: &str) -> Result<String> {
        match parse_data_uri(audio_data_uri) {
            Ok(decoded) => match self.transcribe_multipart(&decoded).await {
                Ok(transcript) => return Ok(transcript),
                Err(err) => {
                    warn!(%err, "multipart transcription failed, falling back to JSON POST");
                }
            },
            Err(err) => {
                warn!(%err, "audio is not a decodable data URI, falling back to JSON POST");
            }
        }

        self.transcribe_json(audio_data_uri).await
    }

    /// Preferred path: decoded bytes as a multipart file upload.
    async fn transcribe_multipart(&self, audio: &DataUri) -> Result<String> {
        let url = format!("{}/transcribe-file", self.base_url);
        debug!(url, mime = %audio.mime, size = audio.bytes.len(), "transcribing via multipart");

        let part = reqwest::multipart::Part::bytes(audio.bytes.clone())
            .file_name("recording.webm")
            .mime_str(&audio.mime)
            .map_err(|err| AppError::Transcribe(format!("invalid audio mime type: {err}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| AppError::Transcribe(format!("transcribe request failed: {err}")))?;

        read_transcript(response).await
    }

    /// Fallback path: the raw data URI in a JSON body.
    async fn transcribe_json(&self, audio_data_uri: &str) -> Result<String> {
        let url = format!("{}/transcribe", self.base_url);
        debug!(url, "transcribing via JSON fallback");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "audio": audio_data_uri }))
            .send()
            .await
            .map_err(|err| AppError::Transcribe(format!("transcribe request failed: {err}")))?;

        read_transcript(response).await
    }
}

async fn read_transcript(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_else(|_| status.to_string());
        return Err(AppError::Transcribe(format!(
            "transcription failed ({status}): {body}"
        )));
    }

    let reply: TranscribeReply = response
        .json()
        .await
        .map_err(|err| AppError::Transcribe(format!("unreadable transcript response: {err}")))?;
    Ok(reply.transcript)
}
