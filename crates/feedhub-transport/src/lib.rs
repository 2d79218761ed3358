//! Transport abstraction layer for feedhub.
//!
//! A [`Connection`] is split once into a [`FrameSink`] (owned by the
//! session's write loop) and a [`FrameStream`] (owned by the read loop), so
//! the two loops never contend for the same half.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — adapter over axum's upgraded WebSocket
//! - `memory` — in-process connection pair for tests

mod error;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketSink, WebSocketStream};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single message-level frame.
///
/// `Ping`/`Pong` are protocol keepalive frames; `Close` asks the peer to
/// end the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// The writing half of a connection.
pub trait FrameSink: Send + 'static {
    /// Writes one frame to the peer.
    fn send(
        &mut self,
        frame: Frame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// The reading half of a connection.
pub trait FrameStream: Send + 'static {
    /// Reads the next frame from the peer.
    ///
    /// Returns `Ok(None)` when the stream has ended. Implementations must be
    /// cancel-safe: dropping the future before it completes loses no frame.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;
}

/// An accepted connection, ready to be split into its two halves.
pub trait Connection: Send + 'static {
    type Sink: FrameSink;
    type Stream: FrameStream;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Splits the connection into independently owned halves.
    ///
    /// The underlying connection is released once both halves are dropped.
    fn split(self) -> (Self::Sink, Self::Stream);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_never_reused() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b > a, "ids are handed out in increasing order");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }
}
