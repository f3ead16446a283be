//! # Transport Messages
//!
//! Typed messages travel inside a `MessageEnvelope` that records the runtime
//! message type. Listeners use that tag to select handlers, so a receiver
//! never has to know the concrete type up front.

use crate::messaging::{MessagingError, MessagingResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contract for messages that can travel through a transport
///
/// The default `message_type` is the Rust type name; override it when
/// senders and receivers live in different crates or across renames.
///
/// ```rust
/// use pirina_transport::messaging::TransportMessage;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct OrderPlaced {
///     order_id: u64,
/// }
///
/// impl TransportMessage for OrderPlaced {
///     fn message_type() -> &'static str {
///         "orders.order_placed"
///     }
/// }
/// ```
pub trait TransportMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn message_type() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A typed message plus the metadata needed to route it on receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Runtime type tag used for handler resolution
    pub message_type: String,

    pub message_id: Uuid,

    pub sent_at: DateTime<Utc>,

    pub body: serde_json::Value,
}

impl MessageEnvelope {
    /// Wrap a typed message, stamping a fresh id and timestamp
    pub fn wrap<M: TransportMessage>(message: &M) -> MessagingResult<Self> {
        let body = serde_json::to_value(message)
            .map_err(|e| MessagingError::message_serialization(e.to_string()))?;

        Ok(Self {
            message_type: M::message_type().to_string(),
            message_id: Uuid::new_v4(),
            sent_at: Utc::now(),
            body,
        })
    }

    /// Whether this envelope carries an `M`
    pub fn is<M: TransportMessage>(&self) -> bool {
        self.message_type == M::message_type()
    }

    /// Decode the body as `M`, refusing envelopes tagged with another type
    pub fn decode<M: TransportMessage>(&self) -> MessagingResult<M> {
        if !self.is::<M>() {
            return Err(MessagingError::message_deserialization(format!(
                "envelope {} carries '{}', not '{}'",
                self.message_id,
                self.message_type,
                M::message_type()
            )));
        }

        serde_json::from_value(self.body.clone())
            .map_err(|e| MessagingError::message_deserialization(e.to_string()))
    }
}
