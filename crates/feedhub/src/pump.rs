//! The two I/O loops that run for every connected session.
//!
//! ```text
//!               ┌────────────── read_pump ───────────────┐
//!  socket ────→ │ frame → Event → EventRouter::route      │
//!               └─────────────────────────────────────────┘
//!                                    │ Session::deliver
//!                                    ▼
//!               ┌────────────── write_pump ──────────────┐
//!  socket ←──── │ select { queue, ping timer, ack timer } │
//!               └─────────────────────────────────────────┘
//! ```
//!
//! Either loop ending deregisters the session. Deregistration closes it,
//! which in turn stops the other loop: the reader sees the close signal,
//! the writer sees its queue end and sends a Close frame. A write the peer
//! is not taking is abandoned on close, and every write gives up after
//! `pong_wait`, so a client that stops reading still releases its socket.

use std::sync::Arc;
use std::time::Duration;

use feedhub_protocol::{Event, Ping, kinds};
use feedhub_session::{Registry, Session, SessionConfig};
use feedhub_transport::{Connection, Frame, FrameSink, FrameStream, TransportError};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::EventRouter;

/// Everything a session's loops need from the server.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub registry: Arc<Registry>,
    pub router: Arc<EventRouter>,
    pub config: SessionConfig,
}

/// Drop guard that deregisters a session when a loop exits.
///
/// Runs on every exit path, panics included. Both loops hold one, and the
/// registry makes the second removal a no-op.
struct DeregisterGuard {
    session: Arc<Session>,
    registry: Arc<Registry>,
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        self.registry.remove(self.session.id());
        // Covers sessions that were never registered.
        self.session.close();
    }
}

/// Registers a session for `conn` and spawns its read and write loops.
pub fn spawn_session<C: Connection>(conn: C, ctx: &SessionContext) -> Arc<Session> {
    let (session, outbound) = Session::new(conn.id(), ctx.config.outbound_capacity);
    ctx.registry.add(Arc::clone(&session));

    let (sink, stream) = conn.split();
    tokio::spawn(write_pump(sink, Arc::clone(&session), outbound, ctx.clone()));
    tokio::spawn(read_pump(stream, Arc::clone(&session), ctx.clone()));
    session
}

/// Reads frames until the client goes away, the pong deadline passes or
/// the session is closed.
pub async fn read_pump<S: FrameStream>(mut stream: S, session: Arc<Session>, ctx: SessionContext) {
    let conn_id = session.id();
    let _guard = DeregisterGuard {
        session: Arc::clone(&session),
        registry: Arc::clone(&ctx.registry),
    };
    let mut deadline = Instant::now() + ctx.config.pong_wait;

    loop {
        let received = tokio::select! {
            _ = session.closed() => {
                debug!(%conn_id, "read loop stopping: session closed");
                break;
            }
            received = time::timeout_at(deadline, stream.recv()) => received,
        };

        let frame = match received {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                debug!(%conn_id, "client disconnected");
                break;
            }
            Ok(Err(e)) => {
                debug!(%conn_id, error = %e, "read failed");
                break;
            }
            Err(_) => {
                warn!(%conn_id, "no pong before read deadline, dropping client");
                break;
            }
        };

        match frame {
            Frame::Text(text) => dispatch(text.as_bytes(), &session, &ctx.router),
            Frame::Binary(data) => dispatch(&data, &session, &ctx.router),
            Frame::Pong(_) => deadline = Instant::now() + ctx.config.pong_wait,
            // Answered by the WebSocket layer.
            Frame::Ping(_) => {}
            Frame::Close => {
                debug!(%conn_id, "client sent close");
                break;
            }
        }
    }
}

fn dispatch(data: &[u8], session: &Session, router: &EventRouter) {
    let event = match Event::from_slice(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(conn_id = %session.id(), error = %e, "undecodable message dropped");
            return;
        }
    };
    if let Err(e) = router.route(&event, session) {
        warn!(conn_id = %session.id(), kind = %event.kind, error = %e, "event not handled");
    }
}

/// Drains the session's outbound queue onto the socket and drives both
/// keepalive timers.
pub async fn write_pump<K: FrameSink>(
    mut sink: K,
    session: Arc<Session>,
    mut outbound: mpsc::Receiver<Event>,
    ctx: SessionContext,
) {
    let conn_id = session.id();
    let _guard = DeregisterGuard {
        session: Arc::clone(&session),
        registry: Arc::clone(&ctx.registry),
    };

    let write_wait = ctx.config.pong_wait;
    let ping_every = ctx.config.ping_interval();
    let mut ping = time::interval_at(Instant::now() + ping_every, ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ack_every = ctx.config.ack_window;
    let mut ack = time::interval_at(Instant::now() + ack_every, ack_every);
    ack.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(event) = queued else {
                    debug!(%conn_id, "outbound queue closed");
                    let _ = send_frame(&mut sink, Frame::Close, write_wait).await;
                    break;
                };
                if let Err(e) = write_event(&mut sink, &event, &session, write_wait).await {
                    debug!(%conn_id, error = %e, "write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = send_live(&mut sink, Frame::Ping(Vec::new()), &session, write_wait).await {
                    debug!(%conn_id, error = %e, "ping failed");
                    break;
                }
                if !session.is_alive() {
                    let nudge = match Event::new(kinds::PING, &Ping::default()) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(%conn_id, error = %e, "cannot encode ping event");
                            continue;
                        }
                    };
                    if let Err(e) = write_event(&mut sink, &nudge, &session, write_wait).await {
                        debug!(%conn_id, error = %e, "ping event failed");
                        break;
                    }
                }
            }
            _ = ack.tick() => {
                if !session.take_alive() {
                    warn!(%conn_id, "no acknowledgment within window, closing");
                    let _ = send_frame(&mut sink, Frame::Close, write_wait).await;
                    break;
                }
            }
        }
    }
}

/// Writes `event` as a text frame. An event that cannot be encoded is
/// logged and skipped; only transport failures are returned.
async fn write_event<K: FrameSink>(
    sink: &mut K,
    event: &Event,
    session: &Session,
    limit: Duration,
) -> Result<(), TransportError> {
    match event.to_json() {
        Ok(text) => send_live(sink, Frame::Text(text), session, limit).await,
        Err(e) => {
            warn!(conn_id = %session.id(), kind = %event.kind, error = %e, "outbound event not encodable, dropped");
            Ok(())
        }
    }
}

/// Sends one frame, failing with [`TransportError::SendTimeout`] if the
/// peer has not taken it within `limit`.
async fn send_frame<K: FrameSink>(
    sink: &mut K,
    frame: Frame,
    limit: Duration,
) -> Result<(), TransportError> {
    time::timeout(limit, sink.send(frame))
        .await
        .map_err(|_| TransportError::SendTimeout(limit))?
}

/// [`send_frame`], abandoned as soon as the session is closed. A write that
/// completes right away still goes out after the close.
async fn send_live<K: FrameSink>(
    sink: &mut K,
    frame: Frame,
    session: &Session,
    limit: Duration,
) -> Result<(), TransportError> {
    tokio::select! {
        biased;
        sent = send_frame(sink, frame, limit) => sent,
        _ = session.closed() => Err(TransportError::ConnectionClosed(
            "session closed during write".into(),
        )),
    }
}
