//! Agent connection actor: socket lifecycle, correlation, reconnection.
//!
//! One [`AgentConnection`] owns one logical duplex connection to the
//! verification agent. A single background task holds the WebSocket, the
//! pending-request table, the log aggregator, and the expiry queue, so
//! every mutation happens on one task and callers interact only through
//! channels.
//!
//! Lifecycle: `Connecting → Open → Closed → Connecting (after backoff) → …`
//! until a deliberate [`AgentConnection::shutdown`] moves the actor to
//! `Terminated`. Unexpected closure never rejects outstanding requests;
//! they survive the reconnect and either resolve when their terminal frame
//! arrives or time out on their own deadline.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, Sleep};
use tokio_tungstenite::tungstenite::handshake::client::Response;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};

use crate::agent::classifier::{classify, Disposition};
use crate::agent::frame::{ensure_request_id, InboundFrame};
use crate::agent::live::{ThinkingFeed, ThinkingLine};
use crate::agent::logs::LogAggregator;
use crate::agent::pending::{PendingRequest, PendingTable};
use crate::config::GlobalConfig;
use crate::{AppError, Result};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const LOG_BROADCAST_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectFuture =
    Pin<Box<dyn Future<Output = tokio_tungstenite::tungstenite::Result<(WsStream, Response)>> + Send>>;

/// Externally visible connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open; `dispatch` may transmit.
    Open,
    /// The socket closed unexpectedly; a reconnect is scheduled.
    Closed,
    /// Deliberate teardown completed; no further reconnects.
    Terminated,
}

/// Messages from handle methods to the connection actor.
enum Command {
    Dispatch {
        payload: Value,
        timeout: Duration,
        reply: oneshot::Sender<Result<Value>>,
    },
    Cancel {
        request_id: String,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Handle to a live agent connection.
///
/// Cheap to clone; all clones talk to the same actor. The connection stays
/// alive until [`AgentConnection::shutdown`] or until every handle is
/// dropped.
#[derive(Clone)]
pub struct AgentConnection {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<LinkState>,
    log_events: broadcast::Sender<ThinkingLine>,
    default_timeout: Duration,
    thinking_ttl: Duration,
}

/// Join handle for the connection's background task.
pub struct ConnectionRuntime {
    /// The actor task; completes after deliberate teardown.
    pub actor_task: JoinHandle<()>,
}

impl ConnectionRuntime {
    /// Wait for the actor to finish. Meaningful only after `shutdown`.
    pub async fn join(self) {
        let _ = self.actor_task.await;
    }
}

impl AgentConnection {
    /// Open a connection to the configured agent endpoint.
    ///
    /// The actor starts in `Connecting` and begins its first attempt
    /// immediately; this constructor does not wait for the handshake.
    #[must_use]
    pub fn connect(config: &GlobalConfig) -> (Self, ConnectionRuntime) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let (log_events, _) = broadcast::channel(LOG_BROADCAST_CAPACITY);

        let actor = ConnectionActor {
            url: config.endpoints.agent_ws_url.clone(),
            backoff_initial: Duration::from_millis(config.socket.backoff_initial_ms),
            backoff_max_steps: config.socket.backoff_max_steps,
            commands: cmd_rx,
            state: state_tx,
            log_events: log_events.clone(),
            pending: PendingTable::new(),
            logs: LogAggregator::new(),
            expiry: DelayQueue::new(),
            attempt: 0,
        };

        let actor_task = tokio::spawn(actor.run());

        (
            Self {
                cmd_tx,
                state_rx,
                log_events,
                default_timeout: Duration::from_millis(config.socket.dispatch_timeout_ms),
                thinking_ttl: Duration::from_millis(config.socket.thinking_ttl_ms),
            },
            ConnectionRuntime { actor_task },
        )
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for lifecycle state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Wait until the socket reports `Open`, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConnected`] if the socket does not open in
    /// time, or [`AppError::Closed`] if the connection terminates first.
    pub async fn wait_until_open(&self, limit: Duration) -> Result<()> {
        let mut rx = self.state_rx.clone();
        let deadline = Instant::now() + limit;

        loop {
            match *rx.borrow_and_update() {
                LinkState::Open => return Ok(()),
                LinkState::Terminated => {
                    return Err(AppError::Closed("connection terminated".into()))
                }
                LinkState::Connecting | LinkState::Closed => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AppError::NotConnected("socket did not open in time".into()));
            }

            if tokio::time::timeout(remaining, rx.changed()).await.is_err() {
                return Err(AppError::NotConnected("socket did not open in time".into()));
            }
        }
    }

    /// Dispatch a payload with the configured default timeout.
    ///
    /// # Errors
    ///
    /// See [`AgentConnection::dispatch_with_timeout`].
    pub async fn dispatch(&self, payload: Value) -> Result<Value> {
        self.dispatch_with_timeout(payload, self.default_timeout).await
    }

    /// Dispatch a payload and await its terminal frame.
    ///
    /// Injects a generated request id when the payload carries none,
    /// registers the request, transmits, and resolves with the final
    /// payload merged with any accumulated log lines for that id.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotConnected`]: socket not `Open`; checked before any
    ///   network attempt so the caller can fall back to HTTP immediately.
    /// - [`AppError::Transmit`]: the payload could not be written.
    /// - [`AppError::Timeout`]: no terminal frame within `timeout`.
    /// - [`AppError::Cancelled`]: [`AgentConnection::cancel`] was called.
    /// - [`AppError::Closed`]: deliberate teardown while in flight.
    pub async fn dispatch_with_timeout(&self, payload: Value, timeout: Duration) -> Result<Value> {
        // Synchronous precondition, not a deferred timeout: fail fast while
        // the socket is connecting, closed, or torn down.
        if self.state() != LinkState::Open {
            return Err(AppError::NotConnected("agent socket is not open".into()));
        }

        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(Command::Dispatch {
                payload,
                timeout,
                reply,
            })
            .await
            .map_err(|_| AppError::Closed("connection actor is gone".into()))?;

        response
            .await
            .map_err(|_| AppError::Closed("connection actor dropped the request".into()))?
    }

    /// Cancel an in-flight request.
    ///
    /// Performs the same cleanup as a timeout firing: the entry and its
    /// timer are removed, the buffer discarded, and the caller rejected
    /// with [`AppError::Cancelled`]. The remote peer is not signalled.
    pub async fn cancel(&self, request_id: &str) {
        let _ = self
            .cmd_tx
            .send(Command::Cancel {
                request_id: request_id.to_owned(),
            })
            .await;
    }

    /// Ephemeral thinking feed fed by this connection's log stream.
    #[must_use]
    pub fn thinking_feed(&self) -> ThinkingFeed {
        ThinkingFeed::spawn(self.log_events.subscribe(), self.thinking_ttl)
    }

    /// Raw subscription to the per-request log stream.
    #[must_use]
    pub fn subscribe_logs(&self) -> broadcast::Receiver<ThinkingLine> {
        self.log_events.subscribe()
    }

    /// Deliberate teardown.
    ///
    /// Closes the socket (close errors swallowed), rejects every
    /// outstanding request with [`AppError::Closed`], clears all timers and
    /// log buffers, and stops reconnecting. Idempotent: calling on an
    /// already-terminated connection is a no-op.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown { ack }).await.is_ok() {
            let _ = done.await;
        }
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

/// What one iteration of the actor loop observed.
enum Step {
    Command(Option<Command>),
    Expired(String),
    Connected(tokio_tungstenite::tungstenite::Result<(WsStream, Response)>),
    Frame(Option<tokio_tungstenite::tungstenite::Result<WsMessage>>),
    Retry,
}

/// Socket phase held by the actor between iterations.
enum Link {
    Connecting(ConnectFuture),
    Open(WsStream),
    Backoff(Pin<Box<Sleep>>),
}

struct ConnectionActor {
    url: String,
    backoff_initial: Duration,
    backoff_max_steps: u32,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<LinkState>,
    log_events: broadcast::Sender<ThinkingLine>,
    pending: PendingTable,
    logs: LogAggregator,
    expiry: DelayQueue<String>,
    attempt: u32,
}

impl ConnectionActor {
    async fn run(mut self) {
        let mut link = Link::Connecting(Box::pin(connect_async(self.url.clone())));
        let _ = self.state.send(LinkState::Connecting);

        loop {
            let step = match &mut link {
                Link::Connecting(handshake) => tokio::select! {
                    biased;
                    cmd = self.commands.recv() => Step::Command(cmd),
                    Some(expired) = poll_fn(|cx| self.expiry.poll_expired(cx)) => {
                        Step::Expired(expired.into_inner())
                    }
                    outcome = handshake.as_mut() => Step::Connected(outcome),
                },
                Link::Open(ws) => tokio::select! {
                    biased;
                    cmd = self.commands.recv() => Step::Command(cmd),
                    Some(expired) = poll_fn(|cx| self.expiry.poll_expired(cx)) => {
                        Step::Expired(expired.into_inner())
                    }
                    frame = ws.next() => Step::Frame(frame),
                },
                Link::Backoff(delay) => tokio::select! {
                    biased;
                    cmd = self.commands.recv() => Step::Command(cmd),
                    Some(expired) = poll_fn(|cx| self.expiry.poll_expired(cx)) => {
                        Step::Expired(expired.into_inner())
                    }
                    () = delay.as_mut() => Step::Retry,
                },
            };

            match step {
                Step::Command(Some(Command::Dispatch {
                    payload,
                    timeout,
                    reply,
                })) => {
                    self.handle_dispatch(&mut link, payload, timeout, reply).await;
                }
                Step::Command(Some(Command::Cancel { request_id })) => {
                    self.remove_and_reject(
                        &request_id,
                        AppError::Cancelled("request cancelled by caller".into()),
                    );
                }
                Step::Command(Some(Command::Shutdown { ack })) => {
                    self.teardown(link).await;
                    let _ = ack.send(());
                    return;
                }
                Step::Command(None) => {
                    // Every handle is gone; tear down as if shutdown was called.
                    self.teardown(link).await;
                    return;
                }
                Step::Expired(request_id) => {
                    if let Some(entry) = self.pending.take(&request_id) {
                        self.logs.discard(&request_id);
                        debug!(request_id, elapsed = ?entry.started_at.elapsed(), "request timed out");
                        let _ = entry
                            .resolver
                            .send(Err(AppError::Timeout("request timeout".into())));
                    }
                }
                Step::Connected(Ok((ws, _response))) => {
                    info!(url = %self.url, "agent socket open");
                    self.attempt = 0;
                    let _ = self.state.send(LinkState::Open);
                    link = Link::Open(ws);
                }
                Step::Connected(Err(err)) => {
                    warn!(url = %self.url, %err, "agent socket connect failed");
                    link = self.schedule_reconnect();
                }
                Step::Frame(Some(Ok(WsMessage::Text(text)))) => {
                    self.handle_frame(&text);
                }
                Step::Frame(Some(Ok(WsMessage::Close(_)))) | Step::Frame(None) => {
                    warn!(
                        outstanding = self.pending.len(),
                        "agent socket closed unexpectedly; outstanding requests kept"
                    );
                    let _ = self.state.send(LinkState::Closed);
                    link = self.schedule_reconnect();
                }
                Step::Frame(Some(Ok(_))) => {
                    // Binary/ping/pong frames carry no agent events.
                }
                Step::Frame(Some(Err(err))) => {
                    warn!(%err, "agent socket read error; reconnecting");
                    let _ = self.state.send(LinkState::Closed);
                    link = self.schedule_reconnect();
                }
                Step::Retry => {
                    info!(attempt = self.attempt, url = %self.url, "reconnecting to agent");
                    let _ = self.state.send(LinkState::Connecting);
                    link = Link::Connecting(Box::pin(connect_async(self.url.clone())));
                }
            }
        }
    }

    /// Register and transmit one outbound request.
    async fn handle_dispatch(
        &mut self,
        link: &mut Link,
        mut payload: Value,
        timeout: Duration,
        reply: oneshot::Sender<Result<Value>>,
    ) {
        let Link::Open(ws) = link else {
            // The handle races the actor's state transitions; re-check here
            // so a dispatch that slipped past the watch still fails fast.
            let _ = reply.send(Err(AppError::NotConnected("agent socket is not open".into())));
            return;
        };

        let request_id = match ensure_request_id(&mut payload) {
            Ok(id) => id,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };

        let text = payload.to_string();
        if let Err(err) = ws.send(WsMessage::Text(text)).await {
            let _ = reply.send(Err(AppError::Transmit(format!(
                "failed to send request: {err}"
            ))));
            return;
        }

        let expiry_key = self.expiry.insert(request_id.clone(), timeout);
        debug!(request_id, ?timeout, "request dispatched");
        self.pending.insert(
            request_id,
            PendingRequest {
                resolver: reply,
                expiry_key,
                started_at: Instant::now(),
            },
        );
    }

    /// Parse, classify, and act on one inbound text frame.
    fn handle_frame(&mut self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                // Malformed frames are dropped; no caller is affected.
                warn!(%err, "dropping malformed agent frame");
                return;
            }
        };

        match classify(&frame, &self.pending) {
            Disposition::AppendLog { request_id, line } => {
                self.logs.append(&request_id, line.clone());
                let _ = self.log_events.send(ThinkingLine {
                    request_id: Some(request_id),
                    text: line,
                });
            }
            Disposition::Resolve {
                request_id,
                payload,
            } => {
                if let Some(entry) = self.pending.take(&request_id) {
                    self.expiry.remove(&entry.expiry_key);
                    let merged = self.logs.merge_into(&request_id, payload);
                    debug!(request_id, elapsed = ?entry.started_at.elapsed(), "request resolved");
                    let _ = entry.resolver.send(Ok(merged));
                }
            }
            Disposition::ResolveOldest { payload } => {
                if let Some((request_id, entry)) = self.pending.take_oldest() {
                    self.expiry.remove(&entry.expiry_key);
                    let merged = self.logs.merge_into(&request_id, payload);
                    debug!(request_id, "id-less terminal frame matched oldest request");
                    let _ = entry.resolver.send(Ok(merged));
                }
            }
            Disposition::StrayLog { line, is_error } => {
                if is_error {
                    error!(line, "agent log");
                } else {
                    info!(line, "agent log");
                }
                if let Some(request_id) = self.pending.oldest_id().map(str::to_owned) {
                    self.logs.append(&request_id, line.clone());
                    let _ = self.log_events.send(ThinkingLine {
                        request_id: Some(request_id),
                        text: line,
                    });
                } else {
                    let _ = self.log_events.send(ThinkingLine {
                        request_id: None,
                        text: line,
                    });
                }
            }
            Disposition::Diagnostics { reason } => {
                debug!(reason, frame = %frame.raw, "unrouted agent event");
            }
        }
    }

    /// Remove one request and reject its caller (cancel path).
    fn remove_and_reject(&mut self, request_id: &str, err: AppError) {
        if let Some(entry) = self.pending.take(request_id) {
            self.expiry.remove(&entry.expiry_key);
            self.logs.discard(request_id);
            let _ = entry.resolver.send(Err(err));
        }
    }

    /// Deliberate teardown: close, reject everything, stop.
    async fn teardown(&mut self, link: Link) {
        if let Link::Open(mut ws) = link {
            // Close errors are swallowed; the socket is going away regardless.
            let _ = ws.close(None).await;
        }

        let outstanding = self.pending.drain();
        if !outstanding.is_empty() {
            info!(count = outstanding.len(), "rejecting outstanding requests on teardown");
        }
        for (request_id, entry) in outstanding {
            debug!(request_id, "rejected by teardown");
            let _ = entry
                .resolver
                .send(Err(AppError::Closed("socket closed".into())));
        }

        self.expiry.clear();
        self.logs.clear();
        let _ = self.state.send(LinkState::Terminated);
    }

    /// Enter the backoff phase for the next reconnect attempt.
    ///
    /// Delay doubles per consecutive failure starting from the configured
    /// initial value and stops growing after `backoff_max_steps` doublings;
    /// attempts continue at the plateau until teardown.
    fn schedule_reconnect(&mut self) -> Link {
        let delay = backoff_delay(self.backoff_initial, self.attempt, self.backoff_max_steps);
        self.attempt = self.attempt.saturating_add(1);
        debug!(attempt = self.attempt, ?delay, "reconnect scheduled");
        Link::Backoff(Box::pin(sleep(delay)))
    }
}

/// Reconnect delay for the given attempt number.
#[must_use]
pub fn backoff_delay(initial: Duration, attempt: u32, max_steps: u32) -> Duration {
    let exponent = attempt.min(max_steps);
    initial.saturating_mul(2_u32.saturating_pow(exponent))
}
