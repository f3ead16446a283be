//! # Handler Invocation

use crate::handlers::{HandlerInvoker, MessageHandler};
use crate::messaging::{MessageEnvelope, MessagingError, MessagingResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Invokes handlers one after another, stopping at the first failure
///
/// Cancellation is checked before each handler. A failing handler's error is
/// wrapped as `HandlerFailed`; cancellation errors pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialHandlerInvoker;

#[async_trait]
impl HandlerInvoker for SequentialHandlerInvoker {
    async fn invoke_handlers(
        &self,
        handlers: &[Arc<dyn MessageHandler>],
        envelope: &MessageEnvelope,
        cancellation: &CancellationToken,
    ) -> MessagingResult<()> {
        for handler in handlers {
            if cancellation.is_cancelled() {
                return Err(MessagingError::cancelled("invoke_handlers"));
            }

            debug!(
                handler = %handler.name(),
                message_id = %envelope.message_id,
                "Invoking handler"
            );

            if let Err(error) = handler.handle(envelope, cancellation).await {
                if matches!(error, MessagingError::Cancelled { .. }) {
                    return Err(error);
                }

                warn!(
                    handler = %handler.name(),
                    message_type = %envelope.message_type,
                    message_id = %envelope.message_id,
                    error = %error,
                    "Handler failed"
                );
                return Err(MessagingError::handler_failed(
                    handler.name(),
                    envelope.message_type.clone(),
                    error.to_string(),
                ));
            }
        }

        Ok(())
    }
}
