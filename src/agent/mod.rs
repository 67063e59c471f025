//! Streaming request correlation and reconnection layer.
//!
//! The modules here implement the duplex link to the remote verification
//! agent: [`connection`] owns the socket and its actor, [`pending`] holds
//! the in-flight table, [`classifier`] routes inbound frames, [`logs`]
//! accumulates progress lines for final results, [`live`] projects them
//! into an ephemeral thinking indicator, and [`fallback`] is the
//! non-streaming HTTP escape hatch.

pub mod classifier;
pub mod connection;
pub mod fallback;
pub mod frame;
pub mod live;
pub mod logs;
pub mod pending;

pub use connection::{AgentConnection, ConnectionRuntime, LinkState};
pub use fallback::FallbackTransport;
pub use live::{ThinkingFeed, ThinkingLine};
