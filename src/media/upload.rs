//! File upload client: multipart POST returning a public URL.

use serde::Deserialize;
use tracing::debug;

use crate::{AppError, Result};

/// Response body from the upload endpoint.
#[derive(Debug, Deserialize)]
struct UploadReply {
    /// Public URL when the object was made public.
    public_url: Option<String>,
    /// Storage object name; fallback when no public URL is present.
    object_name: Option<String>,
}

/// Client for the binary upload endpoint.
#[derive(Debug, Clone)]
pub struct UploadClient {
    client: reqwest::Client,
    upload_url: String,
}

impl UploadClient {
    /// Create an upload client for the given endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client, upload_url: String) -> Self {
        Self { client, upload_url }
    }

    /// Upload one file's bytes and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Upload` on transport failures, non-success
    /// statuses, or a response carrying neither URL nor object name.
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        debug!(file_name, size = bytes.len(), url = %self.upload_url, "uploading file");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_owned());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| AppError::Upload(format!("upload request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upload(format!("upload failed ({status})")));
        }

        let reply: UploadReply = response
            .json()
            .await
            .map_err(|err| AppError::Upload(format!("unreadable upload response: {err}")))?;

        reply
            .public_url
            .or(reply.object_name)
            .ok_or_else(|| AppError::Upload("upload response carried no URL".into()))
    }
}
