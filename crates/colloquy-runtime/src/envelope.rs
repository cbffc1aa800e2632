//! The payload shape every chat message travels in.
//!
//! ```json
//! { "event": "message", "data": { "text": "hi" }, "sender": "ian", "chat": "chat-engine#chat#lobby" }
//! ```
//!
//! Handlers receive the envelope augmented with the network timetoken.

use colloquy_core::{Payload, Timetoken};
use serde::{Deserialize, Serialize};

/// A chat event as published on the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, e.g. `message` or `$.typing.start`.
    pub event: String,
    /// Event data.
    #[serde(default)]
    pub data: Payload,
    /// Uuid of the publishing user.
    pub sender: String,
    /// Channel of the chat the event belongs to.
    pub chat: String,
}

impl Envelope {
    pub fn new(
        event: impl Into<String>,
        data: Payload,
        sender: impl Into<String>,
        chat: impl Into<String>,
    ) -> Self {
        Self {
            event: event.into(),
            data,
            sender: sender.into(),
            chat: chat.into(),
        }
    }

    /// Decodes an envelope from a received payload.
    pub fn from_payload(payload: Payload) -> serde_json::Result<Self> {
        serde_json::from_value(payload)
    }

    pub fn to_payload(&self) -> serde_json::Result<Payload> {
        serde_json::to_value(self)
    }

    /// The payload handed to handlers: the envelope plus its timetoken.
    pub fn delivered(self, timetoken: Timetoken) -> serde_json::Result<Payload> {
        serde_json::to_value(Delivered {
            envelope: self,
            timetoken,
        })
    }
}

#[derive(Serialize)]
struct Delivered {
    #[serde(flatten)]
    envelope: Envelope,
    timetoken: Timetoken,
}
