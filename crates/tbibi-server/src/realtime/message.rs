//! Chat message wire format.
//!
//! Both directions carry the same JSON object:
//! `{"chat_id", "sender_id", "recipient_id", "content"}`, all strings.
//! Recipients receive the sender's frame byte-for-byte; this type is only
//! used to validate it and read the routing fields.

use serde::{Deserialize, Serialize};

/// One chat message as sent over the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Chat the message belongs to.
    pub chat_id: String,
    /// Author.
    pub sender_id: String,
    /// User the message is delivered to.
    pub recipient_id: String,
    /// Text body.
    pub content: String,
}

impl ChatMessage {
    /// Parse a text frame. Every field is required and must be a string.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
