//! # Message Serialization
//!
//! The wire format is whatever the injected serializer produces; JSON is the default.

use crate::messaging::{MessageEnvelope, MessagingError, MessagingResult};
use std::fmt;

/// Converts envelopes to and from the bytes a channel carries
pub trait MessageSerializer: Send + Sync + fmt::Debug {
    fn serialise(&self, envelope: &MessageEnvelope) -> MessagingResult<Vec<u8>>;

    /// Empty or null payloads fail with `MalformedPayload`
    fn deserialise(&self, bytes: &[u8]) -> MessagingResult<MessageEnvelope>;
}

/// JSON envelope serializer built on serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl MessageSerializer for JsonSerializer {
    fn serialise(&self, envelope: &MessageEnvelope) -> MessagingResult<Vec<u8>> {
        serde_json::to_vec(envelope)
            .map_err(|e| MessagingError::message_serialization(e.to_string()))
    }

    fn deserialise(&self, bytes: &[u8]) -> MessagingResult<MessageEnvelope> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(MessagingError::malformed_payload("payload is empty"));
        }

        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if value.is_null() {
            return Err(MessagingError::malformed_payload("payload is null"));
        }

        serde_json::from_value(value)
            .map_err(|e| MessagingError::message_deserialization(e.to_string()))
    }
}
