//! In-process connection pair.
//!
//! [`pair`] returns a server-side [`MemoryConnection`] and the client-side
//! [`MemoryPeer`] that drives it. Dropping the peer ends the server's
//! stream, which is how tests simulate a client hanging up.

use tokio::sync::mpsc;

use crate::{Connection, ConnectionId, Frame, FrameSink, FrameStream, TransportError};

/// Creates a connected server/client pair.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (to_peer, from_server) = mpsc::unbounded_channel();
    let (to_server, from_peer) = mpsc::unbounded_channel();
    let id = ConnectionId::next();
    (
        MemoryConnection {
            id,
            tx: to_peer,
            rx: from_peer,
        },
        MemoryPeer {
            tx: to_server,
            rx: from_server,
        },
    )
}

/// Server side of a [`pair`].
pub struct MemoryConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl Connection for MemoryConnection {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn split(self) -> (MemorySink, MemoryStream) {
        (MemorySink { tx: self.tx }, MemoryStream { rx: self.rx })
    }
}

/// Writing half of a [`MemoryConnection`]. Frames go straight to the peer.
pub struct MemorySink {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }
}

/// Reading half of a [`MemoryConnection`]. Ends when the peer is dropped.
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Client side of a [`pair`].
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Sends a frame to the server. Returns `false` once the server side
    /// has been dropped.
    pub fn send(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }

    /// Convenience for `send(Frame::Text(..))`.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    /// Waits for the next frame from the server. `None` once the server's
    /// sink has been dropped.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}
