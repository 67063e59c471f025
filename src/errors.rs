//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Dispatch attempted while the agent socket is not open.
    NotConnected(String),
    /// No terminal frame arrived within the configured window.
    Timeout(String),
    /// The connection was deliberately torn down with requests outstanding.
    Closed(String),
    /// The outbound payload could not be written to the socket.
    Transmit(String),
    /// The server sent a payload the caller cannot interpret.
    Protocol(String),
    /// Caller-initiated cancellation of an in-flight request.
    Cancelled(String),
    /// Classified failure from the HTTP fallback path (user-facing text).
    Fallback(String),
    /// File upload to the media endpoint failed.
    Upload(String),
    /// Speech-to-text request failed.
    Transcribe(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Identity or credential lookup failure.
    Identity(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::NotConnected(msg) => write!(f, "not connected: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Closed(msg) => write!(f, "closed: {msg}"),
            Self::Transmit(msg) => write!(f, "transmit: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Fallback(msg) => write!(f, "fallback: {msg}"),
            Self::Upload(msg) => write!(f, "upload: {msg}"),
            Self::Transcribe(msg) => write!(f, "transcribe: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Identity(msg) => write!(f, "identity: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
