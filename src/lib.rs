#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pirina Transport
//!
//! Circuit-breaker protected queue transport: per-queue managers, listeners
//! and dispatchers bootstrapped by transport providers.
//!
//! ## Overview
//!
//! A provider sets up one channel per queue name on first use. Outbound
//! messages flow through a dispatcher into the queue's transport manager,
//! which gates every send with that queue's circuit breaker. Inbound payloads
//! are pushed by the channel to its listeners in registration order; a
//! listener resolves handlers by the envelope's runtime message type.
//!
//! ```text
//! get_dispatcher(queue) → QueueDispatcher → TransportManager → CircuitBreaker → TransportChannel
//! TransportChannel → MessageListener (in order) → HandlerInvoker → MessageHandler
//! ```
//!
//! ## Module Organization
//!
//! - [`resilience`] - Circuit breaker, notifications, metrics and per-queue registry
//! - [`messaging`] - Channels, transport manager, listeners, dispatchers, in-memory broker
//! - [`handlers`] - Handler registry and invocation
//! - [`providers`] - Read-only, write-only and read-write providers
//! - [`config`] - YAML configuration loading
//! - [`logging`] - Structured logging and the event logger seam
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pirina_transport::handlers::HandlerRegistry;
//! use pirina_transport::messaging::{DispatcherExt, InMemoryBroker, InMemoryChannelFactory, TransportMessage};
//! use pirina_transport::providers::{
//!     DefaultComponentFactory, DispatchingProvider, ReadWriteProvider, StaticConnectionString,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct OrderPlaced {
//!     order_id: u64,
//! }
//!
//! impl TransportMessage for OrderPlaced {}
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Arc::new(InMemoryBroker::new(10));
//! let factory = DefaultComponentFactory::builder()
//!     .channel_factory(Arc::new(InMemoryChannelFactory::new(broker)))
//!     .handler_resolver(Arc::new(HandlerRegistry::new()))
//!     .build()?;
//!
//! let provider = ReadWriteProvider::new(
//!     Arc::new(StaticConnectionString::new("inmemory://localhost")),
//!     Arc::new(factory),
//! );
//!
//! let token = CancellationToken::new();
//! let dispatcher = provider.get_dispatcher("orders", &token).await?;
//! dispatcher.send_message(&OrderPlaced { order_id: 1 }, &token).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod handlers;
pub mod logging;
pub mod messaging;
pub mod providers;
pub mod resilience;

pub use config::{ConfigManager, ConfigurationError, TransportConfig};
pub use messaging::{MessagingError, MessagingResult};
pub use providers::{DispatchingProvider, TransportProvider};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerEvent, CircuitState};
