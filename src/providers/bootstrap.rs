//! Shared setup logic behind the read-only, write-only and read-write providers.

use crate::logging::{log_error, log_transport_operation, EventId, EventLogger, Severity, TracingEventLogger};
use crate::messaging::{
    MessagingError, MessagingResult, TransportConfiguration, TransportConnection,
    TransportDispatcher, TransportManager, TransportMode,
};
use crate::providers::{ConnectionStringProvider, QueueCache, TransportComponentFactory};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SOURCE: &str = "TransportProvider";

/// Components bootstrapped for one queue
#[derive(Clone)]
pub(crate) struct QueueBinding {
    pub(crate) manager: Arc<TransportManager>,
    pub(crate) dispatcher: Option<Arc<dyn TransportDispatcher>>,
}

pub(crate) struct ProviderCore {
    mode: TransportMode,
    connection_strings: Arc<dyn ConnectionStringProvider>,
    factory: Arc<dyn TransportComponentFactory>,
    event_logger: Arc<dyn EventLogger>,
    queues: QueueCache<QueueBinding>,
}

impl ProviderCore {
    pub(crate) fn new(
        mode: TransportMode,
        connection_strings: Arc<dyn ConnectionStringProvider>,
        factory: Arc<dyn TransportComponentFactory>,
    ) -> Self {
        Self {
            mode,
            connection_strings,
            factory,
            event_logger: Arc::new(TracingEventLogger),
            queues: QueueCache::new(),
        }
    }

    pub(crate) fn set_event_logger(&mut self, event_logger: Arc<dyn EventLogger>) {
        self.event_logger = event_logger;
    }

    pub(crate) fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Bootstrap `queue_name` once; later calls return the cached binding
    pub(crate) async fn setup(
        &self,
        queue_name: &str,
        cancellation: &CancellationToken,
    ) -> MessagingResult<QueueBinding> {
        if queue_name.trim().is_empty() {
            return Err(MessagingError::invalid_argument(
                "queue_name",
                "queue name must not be empty",
            ));
        }

        self.queues
            .get_or_try_init(queue_name, || self.bootstrap(queue_name, cancellation))
            .await
    }

    async fn bootstrap(
        &self,
        queue_name: &str,
        cancellation: &CancellationToken,
    ) -> MessagingResult<QueueBinding> {
        let configuration = TransportConfiguration::new(
            TransportConnection::new(self.connection_strings.connection_string(), queue_name),
            self.mode,
        );

        let result = self.build_binding(configuration, cancellation).await;

        match &result {
            Ok(_) => {
                log_transport_operation("setup", queue_name, "ready", Some(&self.mode.to_string()));
                self.event_logger.log(
                    Severity::Info,
                    EventId::QueueSetup,
                    SOURCE,
                    &format!("Queue '{queue_name}' set up ({})", self.mode),
                );
            }
            Err(error) => log_error(SOURCE, "setup", &error.to_string(), Some(queue_name)),
        }

        result
    }

    async fn build_binding(
        &self,
        configuration: TransportConfiguration,
        cancellation: &CancellationToken,
    ) -> MessagingResult<QueueBinding> {
        let manager = self.factory.create_manager(configuration).await?;

        if self.mode.can_receive() {
            let listener = self.factory.create_listener()?;
            if !listener.attach_to(&manager) {
                self.event_logger.log(
                    Severity::Warning,
                    EventId::ListenerAttachFailed,
                    SOURCE,
                    &format!(
                        "Listener could not attach to queue '{}'; it will run without one",
                        manager.queue_name()
                    ),
                );
            }
        }

        let dispatcher = if self.mode.can_send() {
            Some(self.factory.create_dispatcher(Arc::clone(&manager))?)
        } else {
            None
        };

        if let Err(error) = manager.start(cancellation).await {
            // Release whatever the channel acquired before the failure
            if let Err(stop_error) = manager.stop(&CancellationToken::new()).await {
                warn!(
                    queue_name = %manager.queue_name(),
                    error = %stop_error,
                    "Failed to stop channel after unsuccessful start"
                );
            }
            return Err(error);
        }

        Ok(QueueBinding {
            manager,
            dispatcher,
        })
    }

    /// Dispatcher for `queue_name`, setting the queue up on first use
    pub(crate) async fn dispatcher(
        &self,
        queue_name: &str,
        cancellation: &CancellationToken,
    ) -> MessagingResult<Arc<dyn TransportDispatcher>> {
        let binding = self.setup(queue_name, cancellation).await?;
        binding.dispatcher.ok_or_else(|| {
            MessagingError::internal(format!(
                "no dispatcher for queue '{queue_name}' in {} mode",
                self.mode
            ))
        })
    }

    /// Stop every channel; cache entries are kept. Returns the first failure.
    pub(crate) async fn stop_all(&self, cancellation: &CancellationToken) -> MessagingResult<()> {
        let mut first_error = None;

        for binding in self.queues.values() {
            if let Err(error) = binding.manager.stop(cancellation).await {
                log_error(SOURCE, "stop", &error.to_string(), Some(binding.manager.queue_name()));
                first_error.get_or_insert(error);
            }
        }

        info!(queues = self.queues.len(), mode = %self.mode, "⏹️ Transport provider stopped");

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub(crate) fn queue_names(&self) -> Vec<String> {
        self.queues.queue_names()
    }

    pub(crate) fn manager(&self, queue_name: &str) -> Option<Arc<TransportManager>> {
        self.queues.get(queue_name).map(|binding| binding.manager)
    }
}

impl fmt::Debug for ProviderCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCore")
            .field("mode", &self.mode)
            .field("factory", &self.factory)
            .field("queues", &self.queues.queue_names())
            .finish()
    }
}
