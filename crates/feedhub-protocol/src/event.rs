//! The `{type, payload}` envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::ProtocolError;

/// Event-type discriminators used on the wire.
pub mod kinds {
    /// Client → server: chat message to broadcast.
    pub const SEND_MESSAGE: &str = "send_message";
    /// Server → client: chat broadcast or feed update.
    pub const NEW_MESSAGE: &str = "new_message";
    /// Client → server request and server → client status reply.
    pub const SUBSCRIBE: &str = "subscribe";
    /// Client → server request and server → client status reply.
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    /// Client → server: liveness acknowledgment.
    pub const ACKNOWLEDGE: &str = "acknowledge";
    /// Server → client: reply to `acknowledge`.
    pub const CONNECTION_INIT: &str = "connection_init";
    /// Server → client: application-level keepalive fallback.
    pub const PING: &str = "ping";
}

/// A tagged envelope around an opaque JSON payload.
///
/// `payload` is kept as raw JSON text. Only [`Event::decode_payload`]
/// turns it into a concrete type, and only the handler resolved for
/// `kind` calls it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

impl Event {
    /// Builds an event by serializing `payload`.
    pub fn new<T: Serialize>(
        kind: impl Into<String>,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let payload =
            serde_json::value::to_raw_value(payload).map_err(ProtocolError::Encode)?;
        Ok(Self {
            kind: kind.into(),
            payload: Some(payload),
        })
    }

    /// Parses an envelope from raw bytes. The payload is not inspected
    /// beyond being well-formed JSON.
    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        let event: Event = serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        if event.kind.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty event type".into()));
        }
        Ok(event)
    }

    /// Serializes the envelope to JSON text.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decodes the payload as `T`. A missing payload decodes as JSON `null`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let raw = self.payload.as_deref().map_or("null", RawValue::get);
        serde_json::from_str(raw).map_err(ProtocolError::Decode)
    }

    /// The raw payload text, if any.
    pub fn raw_payload(&self) -> Option<&str> {
        self.payload.as_deref().map(RawValue::get)
    }
}
