//! # Transport Providers
//!
//! Per-queue bootstrap. A provider builds a channel configuration from its
//! connection string and the queue name, asks the component factory for a
//! manager (plus a listener when it receives and a dispatcher when it sends)
//! and starts the manager. Each queue is set up at most once per provider,
//! so repeated `get_dispatcher` calls return the same dispatcher.
//!
//! | Provider            | Channel mode  | Listener | Dispatcher |
//! |---------------------|---------------|----------|------------|
//! | `ReadOnlyProvider`  | `ReceiveOnly` | yes      | no         |
//! | `WriteOnlyProvider` | `SendOnly`    | no       | yes        |
//! | `ReadWriteProvider` | `SendReceive` | yes      | yes        |

pub mod cache;
pub mod connection;
mod bootstrap;
pub mod factory;
mod variants;

pub use cache::QueueCache;
pub use connection::{ConnectionStringProvider, StaticConnectionString};
pub use factory::{DefaultComponentFactory, DefaultComponentFactoryBuilder, TransportComponentFactory};
pub use variants::{ReadOnlyProvider, ReadWriteProvider, WriteOnlyProvider};

use crate::messaging::{MessagingResult, TransportDispatcher, TransportManager, TransportMode};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sets up and owns the transport components of the queues it serves
#[async_trait]
pub trait TransportProvider: Send + Sync + fmt::Debug {
    fn mode(&self) -> TransportMode;

    /// Bootstrap a queue; idempotent
    async fn setup(&self, queue_name: &str, cancellation: &CancellationToken) -> MessagingResult<()>;

    /// Stop every channel, keeping the set-up queues cached
    async fn stop_all(&self, cancellation: &CancellationToken) -> MessagingResult<()>;

    /// Queues set up so far, sorted
    fn queue_names(&self) -> Vec<String>;

    fn manager(&self, queue_name: &str) -> Option<Arc<TransportManager>>;
}

/// Provider that can send
#[async_trait]
pub trait DispatchingProvider: TransportProvider {
    /// The queue's dispatcher; the first call sets the queue up
    async fn get_dispatcher(
        &self,
        queue_name: &str,
        cancellation: &CancellationToken,
    ) -> MessagingResult<Arc<dyn TransportDispatcher>>;
}
