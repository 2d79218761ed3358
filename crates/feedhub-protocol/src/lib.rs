//! Wire protocol for feedhub.
//!
//! Every application-level message, in both directions, is an [`Event`]:
//!
//! ```text
//! {"type": "<discriminator>", "payload": <any JSON>}
//! ```
//!
//! The payload stays raw until a handler for the discriminator asks for
//! it, so unknown event types are never parsed past the envelope.
//!
//! ```text
//! Transport (frames) → Protocol (Event) → Router (typed payloads)
//! ```

mod error;
mod event;
mod payload;

pub use error::ProtocolError;
pub use event::{kinds, Event};
pub use payload::{
    ConnectionInit, NewMessage, Ping, SendMessage, SubscriptionReply,
    SubscriptionRequest, SubscriptionStatus,
};
