//! Error types for the hub.

use std::path::PathBuf;

use feedhub_protocol::ProtocolError;
use feedhub_session::SessionError;
use feedhub_ticker::TickerError;
use feedhub_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (queue full, closed, token outstanding).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A feed could not be built.
    #[error(transparent)]
    Ticker(#[from] TickerError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Binding or serving the listener failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an inbound event was not handled.
///
/// None of these close the connection; the read loop logs them and moves
/// on to the next message.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// No handler is registered for this `type`. The payload was never
    /// looked at.
    #[error("no handler for event type {0:?}")]
    UnknownEventType(String),

    /// The payload did not match what the handler for `kind` expects.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: ProtocolError,
    },

    /// A reply could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A reply could not be queued for the session.
    #[error(transparent)]
    Delivery(#[from] SessionError),
}

/// Problems loading or validating [`Settings`](crate::Settings).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse settings: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedhub_transport::ConnectionId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let hub_err: HubError = err.into();
        assert!(matches!(hub_err, HubError::Transport(_)));
        assert!(hub_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let hub_err: HubError = err.into();
        assert!(matches!(hub_err, HubError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Closed(ConnectionId::new(3));
        let hub_err: HubError = err.into();
        assert!(matches!(hub_err, HubError::Session(_)));
        assert!(hub_err.to_string().contains("conn-3"));
    }

    #[test]
    fn test_from_route_error_keeps_kind() {
        let err = RouteError::UnknownEventType("dance".into());
        let hub_err: HubError = err.into();
        assert!(matches!(hub_err, HubError::Route(_)));
        assert!(hub_err.to_string().contains("dance"));
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        let hub_err: HubError = err.into();
        assert!(matches!(hub_err, HubError::Io(_)));
    }
}
