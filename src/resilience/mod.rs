//! # Resilience Module
//!
//! Circuit breaker protection for the outbound send path.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: stop invoking a failing queue for a cooldown period
//! - **Notifications**: Opened/Reset delivered to observers and a broadcast stream
//! - **Metrics Collection**: call outcomes and state transitions per breaker
//! - **Registry**: one breaker per queue, configured with per-queue overrides
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pirina_transport::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig::new(5, Duration::from_secs(300));
//! let circuit_breaker = CircuitBreaker::new("orders", config)?;
//!
//! let result = circuit_breaker
//!     .call(|| async { Ok::<&str, String>("sent") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod events;
pub mod metrics;
pub mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::{CircuitBreakerConfig, GlobalCircuitBreakerSettings};
pub use events::{CircuitBreakerEvent, CircuitBreakerObserver, SubscriptionId};
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use registry::CircuitBreakerRegistry;
