//! Raw broker messages.

use bytes::Bytes;

/// A message received from the broker, before any payload interpretation.
///
/// Owned by the session until it is handed to a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic the message was published on
    pub topic: String,
    /// Unparsed payload bytes
    pub payload: Bytes,
}

impl RawMessage {
    /// Create a new raw message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// The payload as UTF-8, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
