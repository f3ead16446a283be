//! # Message Handlers
//!
//! Handler resolution and invocation seams used by `QueueListener`.
//!
//! Application code implements `Handles<M>` for each message type it cares
//! about and registers it in a `HandlerRegistry`; the registry resolves
//! handlers by the envelope's runtime message type and a `HandlerInvoker`
//! runs them.

pub mod invoker;
pub mod registry;

pub use invoker::SequentialHandlerInvoker;
pub use registry::{HandlerRegistry, TypedHandler};

use crate::messaging::{MessageEnvelope, MessagingResult, TransportMessage};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Type-erased handler working on envelopes
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs and `HandlerFailed` errors
    fn name(&self) -> &str;

    /// Message type tag this handler is registered for
    fn message_type(&self) -> &str;

    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        cancellation: &CancellationToken,
    ) -> MessagingResult<()>;
}

/// Typed handler for messages of type `M`
#[async_trait]
pub trait Handles<M: TransportMessage>: Send + Sync + 'static {
    async fn handle(&self, message: M, cancellation: &CancellationToken) -> MessagingResult<()>;

    fn handler_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Finds every handler interested in a message type
pub trait HandlerResolver: Send + Sync {
    /// Handlers in registration order; empty when none are registered
    fn resolve_all_handlers_for(&self, message_type: &str) -> Vec<Arc<dyn MessageHandler>>;
}

/// Runs resolved handlers against one envelope
#[async_trait]
pub trait HandlerInvoker: Send + Sync {
    async fn invoke_handlers(
        &self,
        handlers: &[Arc<dyn MessageHandler>],
        envelope: &MessageEnvelope,
        cancellation: &CancellationToken,
    ) -> MessagingResult<()>;
}
