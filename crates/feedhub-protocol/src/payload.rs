//! Typed payloads for the known event kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `send_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    pub message: String,
    pub from: String,
}

/// `new_message` payload for chat broadcasts: the sender's message
/// stamped with the server's receive time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub message: String,
    pub from: String,
    pub sent: DateTime<Utc>,
}

impl NewMessage {
    /// Stamps an incoming message with the current time.
    pub fn stamped(msg: SendMessage) -> Self {
        Self {
            message: msg.message,
            from: msg.from,
            sent: Utc::now(),
        }
    }
}

/// `subscribe` / `unsubscribe` request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub currency: String,
}

/// Outcome of a subscribe or unsubscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    #[serde(rename = "Subscribed")]
    Subscribed,
    #[serde(rename = "Already Subscribed")]
    AlreadySubscribed,
    #[serde(rename = "Not Found")]
    NotFound,
    #[serde(rename = "Unsubscribed")]
    Unsubscribed,
    #[serde(rename = "Not Subscribed")]
    NotSubscribed,
}

/// `subscribe` / `unsubscribe` reply payload. The field keeps the
/// request's name; its value is the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionReply {
    pub currency: SubscriptionStatus,
}

/// `connection_init` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInit {
    pub acknowledge: bool,
}

/// `ping` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub message: String,
}

impl Default for Ping {
    fn default() -> Self {
        Self {
            message: "ping".into(),
        }
    }
}
