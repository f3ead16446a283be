//! # Transport Dispatchers
//!
//! Outbound side: wrap a typed message, serialize it to an owned buffer and
//! hand the bytes to the queue's transport manager.

use crate::messaging::{
    MessageEnvelope, MessageSerializer, MessagingResult, TransportManager, TransportMessage,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sends envelopes to one queue
#[async_trait]
pub trait TransportDispatcher: Send + Sync + fmt::Debug {
    fn queue_name(&self) -> &str;

    /// Serialization failures propagate unchanged; send failures surface as `MessageSendFailure`
    async fn send_envelope(
        &self,
        envelope: &MessageEnvelope,
        cancellation: &CancellationToken,
    ) -> MessagingResult<()>;
}

/// Typed sending on top of any dispatcher
#[async_trait]
pub trait DispatcherExt: TransportDispatcher {
    async fn send_message<M: TransportMessage>(
        &self,
        message: &M,
        cancellation: &CancellationToken,
    ) -> MessagingResult<()> {
        let envelope = MessageEnvelope::wrap(message)?;
        self.send_envelope(&envelope, cancellation).await
    }
}

impl<D: TransportDispatcher + ?Sized> DispatcherExt for D {}

/// Dispatcher bound to a transport manager
pub struct QueueDispatcher {
    manager: Arc<TransportManager>,
    serializer: Arc<dyn MessageSerializer>,
}

impl QueueDispatcher {
    pub fn new(manager: Arc<TransportManager>, serializer: Arc<dyn MessageSerializer>) -> Self {
        Self {
            manager,
            serializer,
        }
    }

    pub fn manager(&self) -> &Arc<TransportManager> {
        &self.manager
    }
}

#[async_trait]
impl TransportDispatcher for QueueDispatcher {
    fn queue_name(&self) -> &str {
        self.manager.queue_name()
    }

    async fn send_envelope(
        &self,
        envelope: &MessageEnvelope,
        cancellation: &CancellationToken,
    ) -> MessagingResult<()> {
        let payload = self.serializer.serialise(envelope)?;

        debug!(
            queue_name = %self.manager.queue_name(),
            message_id = %envelope.message_id,
            message_type = %envelope.message_type,
            bytes = payload.len(),
            "📤 Dispatching message"
        );

        self.manager.enqueue_message(payload, cancellation).await
    }
}

impl fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("queue_name", &self.manager.queue_name())
            .field("serializer", &self.serializer)
            .finish()
    }
}
