//! Error types for the session layer.

use std::net::IpAddr;

use feedhub_transport::ConnectionId;

/// Errors that can occur while delivering to sessions or issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session's outbound queue is at capacity. The message was dropped.
    #[error("outbound queue full for {0}")]
    QueueFull(ConnectionId),

    /// The session has been closed and accepts no more messages.
    #[error("session {0} is closed")]
    Closed(ConnectionId),

    /// The address already holds a live one-time token.
    #[error("a one-time token is already outstanding for {0}")]
    TokenOutstanding(IpAddr),
}
