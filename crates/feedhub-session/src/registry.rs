//! The registry: every session that is currently broadcast-visible.
//!
//! A session is reachable by broadcasts if and only if it is in the
//! registry. Removing it closes it, exactly once, no matter how many of
//! its loops race to deregister.
//!
//! # Locking
//!
//! One `RwLock` guards the map. Writers (`add`/`remove`) are short and do
//! no I/O; scans (`for_each_subscriber`/`broadcast_all`) take the read side
//! and only ever `try_send`, so a slow client cannot stall a scan. While
//! scanning, a session's own subscription lock may be taken; nothing takes
//! them in the opposite order.

use std::collections::HashMap;
use std::sync::Arc;

use feedhub_protocol::Event;
use feedhub_transport::ConnectionId;
use parking_lot::RwLock;

use crate::Session;

/// Set of live sessions, keyed by connection id.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: RwLock<HashMap<ConnectionId, Arc<Session>>>,
}

impl Registry {
    /// Creates an empty registry. The server builds one and shares it by `Arc`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `session` broadcast-visible.
    pub fn add(&self, session: Arc<Session>) {
        let id = session.id();
        self.sessions.write().insert(id, session);
        tracing::info!(conn_id = %id, "session registered");
    }

    /// Removes and closes the session with `id`.
    ///
    /// Returns `false` if it was not registered; removing twice is a no-op.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.write().remove(&id);
        match removed {
            Some(session) => {
                session.close();
                tracing::info!(conn_id = %id, dropped = session.dropped_count(), "session removed");
                true
            }
            None => false,
        }
    }

    /// Calls `f` for every registered session subscribed to `feed`.
    ///
    /// Holds the read lock for the whole scan, so no session is added or
    /// removed part-way through. Returns how many sessions matched.
    pub fn for_each_subscriber<F>(&self, feed: &str, mut f: F) -> usize
    where
        F: FnMut(&Arc<Session>),
    {
        let sessions = self.sessions.read();
        let mut matched = 0;
        for session in sessions.values() {
            if session.is_subscribed(feed) {
                f(session);
                matched += 1;
            }
        }
        matched
    }

    /// Queues `event` for every registered session, subscribed or not.
    ///
    /// Sessions whose queue is full or closed are skipped. Returns how many
    /// sessions accepted the event.
    pub fn broadcast_all(&self, event: &Event) -> usize {
        let sessions = self.sessions.read();
        let mut delivered = 0;
        for session in sessions.values() {
            match session.deliver(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        conn_id = %session.id(),
                        dropped = session.dropped_count(),
                        error = %e,
                        "broadcast skipped session"
                    );
                }
            }
        }
        delivered
    }

    /// Looks up a registered session.
    ///
    /// Returns a clone of the `Arc`, so the caller can keep using the session
    /// after it has been removed; it will just be closed by then.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Returns `true` while the session with `id` is broadcast-visible.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    /// Ids of all registered sessions, in ascending order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
