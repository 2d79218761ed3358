//! Error types for the ticker.

use feedhub_protocol::ProtocolError;

/// Errors that can occur while configuring or publishing a feed.
#[derive(Debug, thiserror::Error)]
pub enum TickerError {
    /// A feed configuration is unusable (empty name, empty delta range,
    /// zero interval, negative start value).
    #[error("invalid feed {name:?}: {reason}")]
    InvalidFeed { name: String, reason: String },

    /// The snapshot could not be encoded as an event.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
