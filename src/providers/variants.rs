//! The three provider kinds. They differ only in channel mode and in whether
//! they hand out dispatchers, so one macro stamps out all of them.

use crate::logging::EventLogger;
use crate::messaging::{MessagingResult, TransportDispatcher, TransportManager, TransportMode};
use crate::providers::bootstrap::ProviderCore;
use crate::providers::{
    ConnectionStringProvider, DispatchingProvider, TransportComponentFactory, TransportProvider,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Define a provider struct bound to one `TransportMode`
///
/// Pattern: `transport_provider!(Name, Mode, "doc")` for listen-only providers,
/// `transport_provider!(Name, Mode, "doc", dispatching)` to add `DispatchingProvider`.
macro_rules! transport_provider {
    ($name:ident, $mode:expr, $doc:literal $(, $dispatching:ident)?) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name {
            core: ProviderCore,
        }

        impl $name {
            pub fn new(
                connection_strings: Arc<dyn ConnectionStringProvider>,
                factory: Arc<dyn TransportComponentFactory>,
            ) -> Self {
                Self {
                    core: ProviderCore::new($mode, connection_strings, factory),
                }
            }

            pub fn with_event_logger(mut self, event_logger: Arc<dyn EventLogger>) -> Self {
                self.core.set_event_logger(event_logger);
                self
            }
        }

        #[async_trait]
        impl TransportProvider for $name {
            fn mode(&self) -> TransportMode {
                self.core.mode()
            }

            async fn setup(
                &self,
                queue_name: &str,
                cancellation: &CancellationToken,
            ) -> MessagingResult<()> {
                self.core.setup(queue_name, cancellation).await.map(|_| ())
            }

            async fn stop_all(&self, cancellation: &CancellationToken) -> MessagingResult<()> {
                self.core.stop_all(cancellation).await
            }

            fn queue_names(&self) -> Vec<String> {
                self.core.queue_names()
            }

            fn manager(&self, queue_name: &str) -> Option<Arc<TransportManager>> {
                self.core.manager(queue_name)
            }
        }

        $(transport_provider!(@$dispatching $name);)?
    };

    (@dispatching $name:ident) => {
        #[async_trait]
        impl DispatchingProvider for $name {
            async fn get_dispatcher(
                &self,
                queue_name: &str,
                cancellation: &CancellationToken,
            ) -> MessagingResult<Arc<dyn TransportDispatcher>> {
                self.core.dispatcher(queue_name, cancellation).await
            }
        }
    };
}

transport_provider!(
    ReadOnlyProvider,
    TransportMode::ReceiveOnly,
    "Listen-only provider: sets up receiving channels, never builds dispatchers."
);

transport_provider!(
    WriteOnlyProvider,
    TransportMode::SendOnly,
    "Send-only provider: sets up sending channels and hands out cached dispatchers.",
    dispatching
);

transport_provider!(
    ReadWriteProvider,
    TransportMode::SendReceive,
    "Listening and sending provider: one send-receive channel per queue, with a cached dispatcher.",
    dispatching
);
