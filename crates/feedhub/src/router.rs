//! Dispatch of inbound events to handlers, keyed by the envelope's `type`.
//!
//! The router only looks at the discriminator. Each handler decodes the raw
//! payload into its own type, so an unknown `type` is rejected without
//! touching the payload at all.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use feedhub_protocol::{
    ConnectionInit, Event, NewMessage, SendMessage, SubscriptionReply, SubscriptionRequest,
    SubscriptionStatus, kinds,
};
use feedhub_session::{Registry, Session};
use feedhub_ticker::FeedCatalog;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::RouteError;

/// A handler for one event type. Runs on the session's read loop, so it
/// must not block.
pub type Handler = Box<dyn Fn(&Event, &Session) -> Result<(), RouteError> + Send + Sync>;

/// Maps event types to their handlers. Built once, then shared read-only.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<String, Handler>,
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("EventRouter").field("kinds", &kinds).finish()
    }
}

impl EventRouter {
    /// An empty router. Every event is rejected until a handler is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A router with the chat, subscription and acknowledgment handlers.
    pub fn with_builtin_handlers(registry: Arc<Registry>, catalog: FeedCatalog) -> Self {
        let mut router = Self::new();
        router.register(kinds::SUBSCRIBE, move |event, session| {
            subscribe(event, session, &catalog)
        });
        router.register(kinds::UNSUBSCRIBE, unsubscribe);
        router.register(kinds::SEND_MESSAGE, move |event, _session| {
            send_message(event, &registry)
        });
        router.register(kinds::ACKNOWLEDGE, acknowledge);
        router
    }

    /// Installs `handler` for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Event, &Session) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.handlers.insert(kind.into(), Box::new(handler));
    }

    /// Returns `true` if a handler is registered for `kind`.
    pub fn handles(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Runs the handler registered for `event.kind`.
    ///
    /// # Errors
    /// [`RouteError::UnknownEventType`] if none is registered, otherwise
    /// whatever the handler reports.
    pub fn route(&self, event: &Event, session: &Session) -> Result<(), RouteError> {
        let handler = self
            .handlers
            .get(&event.kind)
            .ok_or_else(|| RouteError::UnknownEventType(event.kind.clone()))?;
        handler(event, session)
    }
}

fn decode<T: DeserializeOwned>(event: &Event) -> Result<T, RouteError> {
    event.decode_payload().map_err(|source| RouteError::Payload {
        kind: event.kind.clone(),
        source,
    })
}

fn reply<T: Serialize>(session: &Session, kind: &str, payload: &T) -> Result<(), RouteError> {
    session.deliver(Event::new(kind, payload)?)?;
    Ok(())
}

fn subscribe(event: &Event, session: &Session, catalog: &FeedCatalog) -> Result<(), RouteError> {
    let request: SubscriptionRequest = decode(event)?;
    let status = if !catalog.contains(&request.currency) {
        SubscriptionStatus::NotFound
    } else if session.subscribe(&request.currency) {
        SubscriptionStatus::Subscribed
    } else {
        SubscriptionStatus::AlreadySubscribed
    };
    tracing::debug!(conn_id = %session.id(), feed = %request.currency, ?status, "subscribe");
    reply(session, kinds::SUBSCRIBE, &SubscriptionReply { currency: status })
}

fn unsubscribe(event: &Event, session: &Session) -> Result<(), RouteError> {
    let request: SubscriptionRequest = decode(event)?;
    let status = if session.unsubscribe(&request.currency) {
        SubscriptionStatus::Unsubscribed
    } else {
        SubscriptionStatus::NotSubscribed
    };
    tracing::debug!(conn_id = %session.id(), feed = %request.currency, ?status, "unsubscribe");
    reply(session, kinds::UNSUBSCRIBE, &SubscriptionReply { currency: status })
}

fn send_message(event: &Event, registry: &Registry) -> Result<(), RouteError> {
    let incoming: SendMessage = decode(event)?;
    let outgoing = Event::new(kinds::NEW_MESSAGE, &NewMessage::stamped(incoming))?;
    let delivered = registry.broadcast_all(&outgoing);
    tracing::debug!(delivered, "chat message broadcast");
    Ok(())
}

fn acknowledge(_event: &Event, session: &Session) -> Result<(), RouteError> {
    session.mark_alive();
    reply(
        session,
        kinds::CONNECTION_INIT,
        &ConnectionInit { acknowledge: true },
    )
}
