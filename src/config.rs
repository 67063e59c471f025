//! Global configuration parsing, validation, and defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Remote endpoint URLs for the verification agent and its collaborators.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EndpointConfig {
    /// WebSocket URL for streaming agent invocation (`wss://…/ws/invoke_agent`).
    pub agent_ws_url: String,
    /// HTTP URL for the non-streaming fallback verification call.
    pub verify_http_url: String,
    /// File upload endpoint returning a public URL.
    #[serde(default)]
    pub upload_url: Option<String>,
    /// Speech-to-text endpoint base (serves `/transcribe-file` and `/transcribe`).
    #[serde(default)]
    pub transcribe_base_url: Option<String>,
}

/// Tunables for the streaming connection and per-request bookkeeping.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SocketConfig {
    /// Per-request dispatch timeout in milliseconds.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// First reconnect delay after an unexpected close, in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    /// Number of doublings before the reconnect delay stops growing.
    #[serde(default = "default_backoff_max_steps")]
    pub backoff_max_steps: u32,
    /// How long a line stays visible in the ephemeral thinking feed, in
    /// milliseconds. Trimming is cosmetic and never touches the buffers
    /// merged into final results.
    #[serde(default = "default_thinking_ttl_ms")]
    pub thinking_ttl_ms: u64,
}

fn default_dispatch_timeout_ms() -> u64 {
    30_000
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_steps() -> u32 {
    6
}

fn default_thinking_ttl_ms() -> u64 {
    4_000
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_steps: default_backoff_max_steps(),
            thinking_ttl_ms: default_thinking_ttl_ms(),
        }
    }
}

fn default_db_file() -> PathBuf {
    PathBuf::from("truelens.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Remote service endpoints.
    pub endpoints: EndpointConfig,
    /// Streaming connection tunables.
    #[serde(default)]
    pub socket: SocketConfig,
    /// Path to the local conversation database file.
    #[serde(default = "default_db_file")]
    pub db_file: PathBuf,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ws = &self.endpoints.agent_ws_url;
        if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "agent_ws_url must be a ws:// or wss:// URL, got `{ws}`"
            )));
        }

        let http = &self.endpoints.verify_http_url;
        if !(http.starts_with("http://") || http.starts_with("https://")) {
            return Err(AppError::Config(format!(
                "verify_http_url must be an http(s) URL, got `{http}`"
            )));
        }

        if self.socket.dispatch_timeout_ms == 0 {
            return Err(AppError::Config(
                "dispatch_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.socket.backoff_initial_ms == 0 {
            return Err(AppError::Config(
                "backoff_initial_ms must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
