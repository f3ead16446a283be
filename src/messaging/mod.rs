//! # Messaging Module
//!
//! Queue transport core: channels, the circuit-breaker gated transport
//! manager, listeners (inbound) and dispatchers (outbound).
//!
//! Outbound: `QueueDispatcher` → `TransportManager` → `CircuitBreaker` → `TransportChannel`.
//! Inbound: `TransportChannel` → each registered `MessageListener` in order → handlers.

pub mod channel;
pub mod dispatcher;
pub mod errors;
pub mod in_memory;
pub mod listener;
pub mod manager;
pub mod message;
pub mod serialization;

pub use channel::{
    ChannelFactory, TransportChannel, TransportConfiguration, TransportConnection, TransportMode,
};
pub use dispatcher::{DispatcherExt, QueueDispatcher, TransportDispatcher};
pub use errors::{MessagingError, MessagingResult};
pub use in_memory::{DeadLetter, InMemoryBroker, InMemoryChannel, InMemoryChannelFactory, QueueStats};
pub use listener::{MessageListener, QueueListener};
pub use manager::{TransportManager, TransportManagerBuilder};
pub use message::{MessageEnvelope, TransportMessage};
pub use serialization::{JsonSerializer, MessageSerializer};
