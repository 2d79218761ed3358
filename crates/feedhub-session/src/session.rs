//! A single connected client, as seen by the rest of the server.
//!
//! The `Session` itself does no I/O. It holds the producer side of the
//! client's outbound queue, the client's feed subscriptions and its
//! liveness flag. The read and write loops that actually talk to the
//! socket live in the server crate and share the session through an
//! `Arc`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use feedhub_protocol::Event;
use feedhub_transport::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::SessionError;

/// Server-side state for one connected client.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,

    /// Producer side of the outbound queue. Taken (and so dropped) by
    /// [`Session::close`], which lets the write loop drain what is left
    /// and then see the queue end.
    outbound: Mutex<Option<mpsc::Sender<Event>>>,

    /// Feed names this client wants updates for. Guarded separately from
    /// the registry so handlers and the broadcaster don't contend on it.
    subscriptions: Mutex<HashSet<String>>,

    /// Set by the `acknowledge` handler, consumed by the write loop once
    /// per acknowledgment window.
    alive: AtomicBool,

    /// Messages dropped because the outbound queue was full.
    dropped: AtomicU64,

    closed: CancellationToken,
}

impl Session {
    /// Creates a session with an outbound queue of `capacity` messages.
    ///
    /// Returns the session and the consumer side of its queue, which
    /// belongs to the write loop.
    pub fn new(id: ConnectionId, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Arc::new(Self {
            id,
            outbound: Mutex::new(Some(tx)),
            subscriptions: Mutex::new(HashSet::new()),
            alive: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            closed: CancellationToken::new(),
        });
        (session, rx)
    }

    /// The id of the connection this session belongs to. Also its registry key.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `event` for this client without waiting.
    ///
    /// # Errors
    /// - [`SessionError::QueueFull`] — the client is not keeping up; the
    ///   event is dropped.
    /// - [`SessionError::Closed`] — the session has been closed.
    pub fn deliver(&self, event: Event) -> Result<(), SessionError> {
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return Err(SessionError::Closed(self.id));
        };
        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SessionError::QueueFull(self.id))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SessionError::Closed(self.id)),
        }
    }

    /// Adds `feed` to the subscription set. Returns `false` if it was
    /// already there.
    pub fn subscribe(&self, feed: &str) -> bool {
        self.subscriptions.lock().insert(feed.to_owned())
    }

    /// Removes `feed` from the subscription set. Returns `false` if it
    /// was not there.
    pub fn unsubscribe(&self, feed: &str) -> bool {
        self.subscriptions.lock().remove(feed)
    }

    /// Returns `true` if the client asked for updates from `feed`.
    pub fn is_subscribed(&self, feed: &str) -> bool {
        self.subscriptions.lock().contains(feed)
    }

    /// Snapshot of the current subscriptions, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut feeds: Vec<String> = self.subscriptions.lock().iter().cloned().collect();
        feeds.sort();
        feeds
    }

    /// Records that the client acknowledged liveness.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Peeks at the liveness flag without clearing it.
    ///
    /// The write loop uses this to decide whether to send the application-level
    /// ping event alongside the protocol Ping.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Reads and clears the liveness flag, starting a new window.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// How many deliveries have been dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Closes the session: no more deliveries are accepted and both I/O
    /// loops are told to stop.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let sender = self.outbound.lock().take();
        self.closed.cancel();
        sender.is_some()
    }

    /// Returns `true` once [`Session::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Completes once [`Session::close`] has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}
