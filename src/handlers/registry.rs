//! # Handler Registry
//!
//! Thread-safe message type → handlers map implementing `HandlerResolver`.

use crate::handlers::{HandlerResolver, Handles, MessageHandler};
use crate::messaging::{MessageEnvelope, MessagingResult, TransportMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Adapts a `Handles<M>` implementation to `MessageHandler`
pub struct TypedHandler<M, H> {
    handler: Arc<H>,
    _message: PhantomData<fn() -> M>,
}

impl<M, H> TypedHandler<M, H>
where
    M: TransportMessage,
    H: Handles<M>,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M, H> MessageHandler for TypedHandler<M, H>
where
    M: TransportMessage,
    H: Handles<M>,
{
    fn name(&self) -> &str {
        self.handler.handler_name()
    }

    fn message_type(&self) -> &str {
        M::message_type()
    }

    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        cancellation: &CancellationToken,
    ) -> MessagingResult<()> {
        let message = envelope.decode::<M>()?;
        self.handler.handle(message, cancellation).await
    }
}

/// Registry of handlers keyed by message type tag
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Vec<Arc<dyn MessageHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for `M`
    pub fn register<M, H>(&self, handler: Arc<H>)
    where
        M: TransportMessage,
        H: Handles<M>,
    {
        self.register_handler(Arc::new(TypedHandler::<M, H>::new(handler)));
    }

    /// Register a type-erased handler under its own message type
    pub fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        let message_type = handler.message_type().to_string();
        let mut entry = self.handlers.entry(message_type.clone()).or_default();
        entry.push(Arc::clone(&handler));

        info!(
            handler = %handler.name(),
            message_type = %message_type,
            handler_count = entry.len(),
            "Registered message handler"
        );
    }

    pub fn handler_count(&self, message_type: &str) -> usize {
        self.handlers
            .get(message_type)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    /// Registered message types, sorted
    pub fn message_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve_all_handlers_for(&self, message_type: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.handlers
            .get(message_type)
            .map(|handlers| handlers.value().clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}
