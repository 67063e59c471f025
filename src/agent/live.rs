//! Ephemeral "thinking" feed, a cosmetic projection of the log stream.
//!
//! The connection actor broadcasts every appended log line; this view
//! subscribes, keeps lines for a fixed TTL, and trims them oldest-first on
//! its own timers. Trimming here can never lose data needed for
//! correctness: the authoritative buffers in [`crate::agent::logs`] are
//! untouched by this component.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// One live log line as broadcast by the connection actor.
#[derive(Debug, Clone)]
pub struct ThinkingLine {
    /// Request the line belongs to, when known.
    pub request_id: Option<String>,
    /// The log text.
    pub text: String,
}

/// Self-trimming view over the broadcast log stream.
///
/// Dropping the feed aborts its background task; the connection actor keeps
/// broadcasting regardless of whether anyone is watching.
pub struct ThinkingFeed {
    lines: Arc<Mutex<VecDeque<ThinkingLine>>>,
    task: JoinHandle<()>,
}

impl ThinkingFeed {
    /// Subscribe to `events` and keep each line visible for `ttl`.
    #[must_use]
    pub fn spawn(mut events: broadcast::Receiver<ThinkingLine>, ttl: Duration) -> Self {
        let lines: Arc<Mutex<VecDeque<ThinkingLine>>> = Arc::default();
        let held = Arc::clone(&lines);

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(line) => {
                        held.lock().await.push_back(line);

                        let trim = Arc::clone(&held);
                        tokio::spawn(async move {
                            sleep(ttl).await;
                            trim.lock().await.pop_front();
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Cosmetic stream; dropped lines only shorten the
                        // indicator, the authoritative buffers are intact.
                        debug!(skipped, "thinking feed lagged behind log stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { lines, task }
    }

    /// Lines currently visible, oldest first.
    pub async fn snapshot(&self) -> Vec<ThinkingLine> {
        self.lines.lock().await.iter().cloned().collect()
    }
}

impl Drop for ThinkingFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}
