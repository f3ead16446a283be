//! # Component Factory
//!
//! Resolves the per-queue components a provider needs: a transport manager
//! for a configuration, a listener, and a dispatcher bound to a manager.

use crate::handlers::{HandlerInvoker, HandlerResolver, SequentialHandlerInvoker};
use crate::logging::{EventLogger, TracingEventLogger};
use crate::messaging::{
    ChannelFactory, JsonSerializer, MessageListener, MessageSerializer, MessagingError,
    MessagingResult, QueueDispatcher, QueueListener, TransportConfiguration, TransportDispatcher,
    TransportManager,
};
use crate::resilience::CircuitBreakerRegistry;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds transport components for providers
#[async_trait]
pub trait TransportComponentFactory: Send + Sync + fmt::Debug {
    /// A manager owning a fresh channel for `configuration` (not started)
    async fn create_manager(
        &self,
        configuration: TransportConfiguration,
    ) -> MessagingResult<Arc<TransportManager>>;

    fn create_listener(&self) -> MessagingResult<Arc<dyn MessageListener>>;

    fn create_dispatcher(
        &self,
        manager: Arc<TransportManager>,
    ) -> MessagingResult<Arc<dyn TransportDispatcher>>;
}

/// Factory wiring `QueueListener`, `QueueDispatcher` and breaker-gated managers
pub struct DefaultComponentFactory {
    channel_factory: Arc<dyn ChannelFactory>,
    circuit_breakers: CircuitBreakerRegistry,
    serializer: Arc<dyn MessageSerializer>,
    handler_resolver: Arc<dyn HandlerResolver>,
    handler_invoker: Arc<dyn HandlerInvoker>,
    event_logger: Arc<dyn EventLogger>,
}

impl DefaultComponentFactory {
    pub fn builder() -> DefaultComponentFactoryBuilder {
        DefaultComponentFactoryBuilder::default()
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerRegistry {
        &self.circuit_breakers
    }
}

#[async_trait]
impl TransportComponentFactory for DefaultComponentFactory {
    async fn create_manager(
        &self,
        configuration: TransportConfiguration,
    ) -> MessagingResult<Arc<TransportManager>> {
        let queue_name = configuration.queue_name().to_string();
        let channel = self.channel_factory.create_channel(configuration)?;
        let circuit_breaker = self.circuit_breakers.get_circuit_breaker(&queue_name).await?;

        let manager = TransportManager::builder()
            .channel(channel)
            .circuit_breaker(circuit_breaker)
            .event_logger(Arc::clone(&self.event_logger))
            .build()?;

        debug!(queue_name = %queue_name, "Transport manager created");
        Ok(Arc::new(manager))
    }

    fn create_listener(&self) -> MessagingResult<Arc<dyn MessageListener>> {
        Ok(Arc::new(QueueListener::new(
            Arc::clone(&self.serializer),
            Arc::clone(&self.handler_resolver),
            Arc::clone(&self.handler_invoker),
            Arc::clone(&self.event_logger),
        )))
    }

    fn create_dispatcher(
        &self,
        manager: Arc<TransportManager>,
    ) -> MessagingResult<Arc<dyn TransportDispatcher>> {
        Ok(Arc::new(QueueDispatcher::new(
            manager,
            Arc::clone(&self.serializer),
        )))
    }
}

impl fmt::Debug for DefaultComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultComponentFactory")
            .field("channel_factory", &self.channel_factory)
            .field("serializer", &self.serializer)
            .field("event_logger", &self.event_logger)
            .finish_non_exhaustive()
    }
}

/// Builder for `DefaultComponentFactory`
///
/// `channel_factory` and `handler_resolver` are required. The rest default to
/// JSON serialization, sequential invocation, tracing-backed event logging
/// and a breaker registry with default configuration.
#[derive(Default)]
pub struct DefaultComponentFactoryBuilder {
    channel_factory: Option<Arc<dyn ChannelFactory>>,
    circuit_breakers: Option<CircuitBreakerRegistry>,
    serializer: Option<Arc<dyn MessageSerializer>>,
    handler_resolver: Option<Arc<dyn HandlerResolver>>,
    handler_invoker: Option<Arc<dyn HandlerInvoker>>,
    event_logger: Option<Arc<dyn EventLogger>>,
}

impl DefaultComponentFactoryBuilder {
    pub fn channel_factory(mut self, channel_factory: Arc<dyn ChannelFactory>) -> Self {
        self.channel_factory = Some(channel_factory);
        self
    }

    pub fn circuit_breakers(mut self, circuit_breakers: CircuitBreakerRegistry) -> Self {
        self.circuit_breakers = Some(circuit_breakers);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn MessageSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn handler_resolver(mut self, handler_resolver: Arc<dyn HandlerResolver>) -> Self {
        self.handler_resolver = Some(handler_resolver);
        self
    }

    pub fn handler_invoker(mut self, handler_invoker: Arc<dyn HandlerInvoker>) -> Self {
        self.handler_invoker = Some(handler_invoker);
        self
    }

    pub fn event_logger(mut self, event_logger: Arc<dyn EventLogger>) -> Self {
        self.event_logger = Some(event_logger);
        self
    }

    pub fn build(self) -> MessagingResult<DefaultComponentFactory> {
        let channel_factory = self.channel_factory.ok_or_else(|| {
            MessagingError::invalid_argument("channel_factory", "a channel factory must be provided")
        })?;
        let handler_resolver = self.handler_resolver.ok_or_else(|| {
            MessagingError::invalid_argument(
                "handler_resolver",
                "a handler resolver must be provided",
            )
        })?;

        Ok(DefaultComponentFactory {
            channel_factory,
            circuit_breakers: self.circuit_breakers.unwrap_or_default(),
            serializer: self.serializer.unwrap_or_else(|| Arc::new(JsonSerializer)),
            handler_resolver,
            handler_invoker: self
                .handler_invoker
                .unwrap_or_else(|| Arc::new(SequentialHandlerInvoker)),
            event_logger: self
                .event_logger
                .unwrap_or_else(|| Arc::new(TracingEventLogger)),
        })
    }
}
