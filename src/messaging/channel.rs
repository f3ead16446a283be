//! # Transport Channels
//!
//! A channel is the raw conduit to one queue. The transport layer only needs
//! `initialise`/`start`/`stop`/`send` from it; inbound messages are pushed by
//! the channel into the listeners registered on its configuration.

use crate::messaging::{MessageListener, MessagingResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Direction(s) a channel is opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportMode {
    ReceiveOnly,
    SendOnly,
    SendReceive,
}

impl TransportMode {
    pub fn can_send(&self) -> bool {
        matches!(self, TransportMode::SendOnly | TransportMode::SendReceive)
    }

    pub fn can_receive(&self) -> bool {
        matches!(self, TransportMode::ReceiveOnly | TransportMode::SendReceive)
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::ReceiveOnly => write!(f, "receive-only"),
            TransportMode::SendOnly => write!(f, "send-only"),
            TransportMode::SendReceive => write!(f, "send-receive"),
        }
    }
}

/// Endpoint plus queue name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportConnection {
    pub connection_string: String,
    pub queue_name: String,
}

impl TransportConnection {
    pub fn new(connection_string: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            queue_name: queue_name.into(),
        }
    }
}

/// Channel configuration: connection, mode and the ordered listener list
///
/// Listeners may be registered while messages are being delivered; each
/// delivery works on a snapshot taken when it starts.
pub struct TransportConfiguration {
    connection: TransportConnection,
    mode: TransportMode,
    listeners: Mutex<Vec<Arc<dyn MessageListener>>>,
}

impl TransportConfiguration {
    pub fn new(connection: TransportConnection, mode: TransportMode) -> Self {
        Self {
            connection,
            mode,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn connection(&self) -> &TransportConnection {
        &self.connection
    }

    pub fn queue_name(&self) -> &str {
        &self.connection.queue_name
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Append a listener; duplicates are kept
    ///
    /// The mode is not consulted: a send-only channel simply never delivers.
    pub fn register_listener(&self, listener: Arc<dyn MessageListener>) {
        let mut listeners = self.listeners.lock();
        listeners.push(listener);
        debug!(
            queue_name = %self.connection.queue_name,
            listener_count = listeners.len(),
            "Listener registered"
        );
    }

    /// Snapshot of the registered listeners in registration order
    pub fn listeners(&self) -> Vec<Arc<dyn MessageListener>> {
        self.listeners.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Hand a payload to every listener in order, stopping at the first failure
    ///
    /// Returns the number of listeners that received the payload.
    pub async fn deliver(
        &self,
        payload: &[u8],
        cancellation: &CancellationToken,
    ) -> MessagingResult<usize> {
        let listeners = self.listeners();

        for listener in &listeners {
            listener.receive_message(payload, cancellation).await?;
        }

        Ok(listeners.len())
    }
}

impl fmt::Debug for TransportConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfiguration")
            .field("queue_name", &self.connection.queue_name)
            .field("mode", &self.mode)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Raw conduit to a single queue
#[async_trait]
pub trait TransportChannel: Send + Sync + fmt::Debug {
    fn configuration(&self) -> &TransportConfiguration;

    /// Prepare the underlying queue; safe to call more than once
    async fn initialise(&self, cancellation: &CancellationToken) -> MessagingResult<()>;

    /// Begin sending/receiving; initialises first if needed
    async fn start(&self, cancellation: &CancellationToken) -> MessagingResult<()>;

    /// Stop receiving and close the channel for sends
    async fn stop(&self, cancellation: &CancellationToken) -> MessagingResult<()>;

    /// Enqueue raw bytes
    async fn send(&self, payload: Vec<u8>, cancellation: &CancellationToken) -> MessagingResult<()>;

    fn is_running(&self) -> bool;
}

/// Creates channels for a configuration
pub trait ChannelFactory: Send + Sync + fmt::Debug {
    fn create_channel(
        &self,
        configuration: TransportConfiguration,
    ) -> MessagingResult<Arc<dyn TransportChannel>>;
}
