//! # Message Listeners
//!
//! A listener turns inbound bytes back into an envelope, resolves the
//! handlers interested in its runtime message type and invokes them.

use crate::handlers::{HandlerInvoker, HandlerResolver};
use crate::logging::{EventId, EventLogger, Severity};
use crate::messaging::{MessageSerializer, MessagingResult, TransportManager};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SOURCE: &str = "QueueListener";

/// Receives raw payloads from a transport manager
#[async_trait]
pub trait MessageListener: Send + Sync + fmt::Debug {
    /// Deserialize and dispatch one payload; failures propagate unchanged
    async fn receive_message(
        &self,
        payload: &[u8],
        cancellation: &CancellationToken,
    ) -> MessagingResult<()>;

    /// Register on `manager`; a listener that cannot attach reports false instead of an error
    fn attach_to(self: Arc<Self>, manager: &TransportManager) -> bool;

    /// Listeners have no running state of their own
    fn start(&self) -> bool {
        true
    }

    fn stop(&self) -> bool {
        true
    }
}

/// Default listener: serializer + handler resolver + handler invoker
pub struct QueueListener {
    serializer: Arc<dyn MessageSerializer>,
    resolver: Arc<dyn HandlerResolver>,
    invoker: Arc<dyn HandlerInvoker>,
    event_logger: Arc<dyn EventLogger>,
}

impl QueueListener {
    pub fn new(
        serializer: Arc<dyn MessageSerializer>,
        resolver: Arc<dyn HandlerResolver>,
        invoker: Arc<dyn HandlerInvoker>,
        event_logger: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            serializer,
            resolver,
            invoker,
            event_logger,
        }
    }
}

#[async_trait]
impl MessageListener for QueueListener {
    async fn receive_message(
        &self,
        payload: &[u8],
        cancellation: &CancellationToken,
    ) -> MessagingResult<()> {
        let envelope = self.serializer.deserialise(payload)?;
        let handlers = self.resolver.resolve_all_handlers_for(&envelope.message_type);

        debug!(
            message_id = %envelope.message_id,
            message_type = %envelope.message_type,
            handler_count = handlers.len(),
            "📥 Message received"
        );

        self.invoker
            .invoke_handlers(&handlers, &envelope, cancellation)
            .await
    }

    fn attach_to(self: Arc<Self>, manager: &TransportManager) -> bool {
        let event_logger = Arc::clone(&self.event_logger);
        manager.register_listener(self);

        event_logger.log(
            Severity::Debug,
            EventId::ListenerAttached,
            SOURCE,
            &format!("Listener attached to queue '{}'", manager.queue_name()),
        );
        true
    }
}

impl fmt::Debug for QueueListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueListener")
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{Handles, HandlerRegistry, SequentialHandlerInvoker};
    use crate::logging::TracingEventLogger;
    use crate::messaging::in_memory::InMemoryBroker;
    use crate::messaging::{
        JsonSerializer, MessageEnvelope, MessagingError, TransportConfiguration,
        TransportConnection, TransportMessage, TransportMode,
    };
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct OrderPlaced {
        order_id: u64,
    }

    impl TransportMessage for OrderPlaced {}

    #[derive(Debug, Default)]
    struct SumOrders {
        total: AtomicU64,
    }

    #[async_trait]
    impl Handles<OrderPlaced> for SumOrders {
        async fn handle(
            &self,
            message: OrderPlaced,
            _cancellation: &CancellationToken,
        ) -> MessagingResult<()> {
            self.total.fetch_add(message.order_id, Ordering::SeqCst);
            Ok(())
        }
    }

    fn listener(registry: Arc<HandlerRegistry>) -> Arc<QueueListener> {
        Arc::new(QueueListener::new(
            Arc::new(JsonSerializer),
            registry,
            Arc::new(SequentialHandlerInvoker),
            Arc::new(TracingEventLogger),
        ))
    }

    fn manager(mode: TransportMode) -> TransportManager {
        let broker = Arc::new(InMemoryBroker::new(10));
        TransportManager::builder()
            .channel(broker.channel(TransportConfiguration::new(
                TransportConnection::new("inmemory://localhost", "orders"),
                mode,
            )))
            .circuit_breaker(Arc::new(
                CircuitBreaker::new("orders", CircuitBreakerConfig::default()).unwrap(),
            ))
            .event_logger(Arc::new(TracingEventLogger))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_receive_invokes_registered_handler() {
        let registry = Arc::new(HandlerRegistry::new());
        let handler = Arc::new(SumOrders::default());
        registry.register::<OrderPlaced, _>(Arc::clone(&handler));

        let envelope = MessageEnvelope::wrap(&OrderPlaced { order_id: 42 }).unwrap();
        let payload = JsonSerializer.serialise(&envelope).unwrap();

        listener(registry)
            .receive_message(&payload, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handler.total.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn test_empty_payload_is_malformed() {
        let error = listener(Arc::new(HandlerRegistry::new()))
            .receive_message(&[], &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(error, MessagingError::MalformedPayload { .. }));
    }

    #[test]
    fn test_attach_to_appends_whatever_the_mode() {
        for mode in [
            TransportMode::ReceiveOnly,
            TransportMode::SendOnly,
            TransportMode::SendReceive,
        ] {
            let target = manager(mode);
            assert!(listener(Arc::new(HandlerRegistry::new())).attach_to(&target));
            assert!(listener(Arc::new(HandlerRegistry::new())).attach_to(&target));
            assert_eq!(target.listener_count(), 2, "{mode}");
        }
    }

    #[test]
    fn test_start_and_stop_are_noops() {
        let listener = listener(Arc::new(HandlerRegistry::new()));
        assert!(listener.start());
        assert!(listener.stop());
    }
}
