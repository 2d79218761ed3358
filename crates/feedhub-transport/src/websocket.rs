//! WebSocket connection adapter over axum's upgraded socket.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use crate::{Connection, ConnectionId, Frame, FrameSink, FrameStream, TransportError};

/// A single upgraded WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    socket: WebSocket,
}

impl WebSocketConnection {
    /// Wraps an upgraded socket and assigns it a fresh id.
    pub fn new(socket: WebSocket) -> Self {
        let id = ConnectionId::next();
        tracing::debug!(%id, "accepted WebSocket connection");
        Self { id, socket }
    }
}

impl Connection for WebSocketConnection {
    type Sink = WebSocketSink;
    type Stream = WebSocketStream;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn split(self) -> (WebSocketSink, WebSocketStream) {
        let (sink, stream) = self.socket.split();
        (
            WebSocketSink { id: self.id, inner: sink },
            WebSocketStream { id: self.id, inner: stream },
        )
    }
}

/// Writing half of a [`WebSocketConnection`].
pub struct WebSocketSink {
    id: ConnectionId,
    inner: SplitSink<WebSocket, Message>,
}

impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close => Message::Close(None),
        };
        self.inner.send(msg).await.map_err(|e| {
            tracing::trace!(id = %self.id, error = %e, "websocket write failed");
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

/// Reading half of a [`WebSocketConnection`].
pub struct WebSocketStream {
    id: ConnectionId,
    inner: SplitStream<WebSocket>,
}

impl FrameStream for WebSocketStream {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.inner.next().await {
            Some(Ok(Message::Text(text))) => {
                Ok(Some(Frame::Text(text.as_str().to_owned())))
            }
            Some(Ok(Message::Binary(data))) => {
                Ok(Some(Frame::Binary(data.to_vec())))
            }
            Some(Ok(Message::Ping(data))) => Ok(Some(Frame::Ping(data.to_vec()))),
            Some(Ok(Message::Pong(data))) => Ok(Some(Frame::Pong(data.to_vec()))),
            Some(Ok(Message::Close(_))) => Ok(Some(Frame::Close)),
            None => Ok(None),
            Some(Err(e)) => {
                tracing::trace!(id = %self.id, error = %e, "websocket read failed");
                Err(TransportError::ReceiveFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    e,
                )))
            }
        }
    }
}
