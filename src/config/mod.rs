//! # Transport Configuration
//!
//! YAML-backed configuration for the queue transport: the connection string
//! handed to channels, circuit breaker thresholds (with per-queue overrides),
//! in-memory broker behaviour and logging.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pirina_transport::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Environment is taken from PIRINA_ENV / APP_ENV (default: development)
//! let manager = ConfigManager::load()?;
//!
//! let breaker = manager.config().circuit_breakers.config_for_queue("orders");
//! println!("orders opens after {} failures", breaker.exceptions_allowed_before_breaking);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::providers::ConnectionStringProvider;
use crate::resilience::{CircuitBreakerConfig, GlobalCircuitBreakerSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Highest threshold accepted from a configuration file
const MAX_CONFIGURED_THRESHOLD: u32 = 100;

/// Root configuration structure mirroring pirina-transport.yaml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Queue endpoint settings
    pub connection: ConnectionConfig,

    /// Circuit breaker configuration for the send path
    #[serde(default)]
    pub circuit_breakers: CircuitBreakersConfig,

    /// In-process broker settings
    #[serde(default)]
    pub in_memory: InMemoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Environment the configuration was resolved for (set by the loader)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Queue endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Opaque connection string handed to channels; `${VAR}` is expanded on load
    pub connection_string: String,
}

/// Circuit breaker configuration from YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakersConfig {
    /// When false, breakers never open
    pub enabled: bool,

    #[serde(default)]
    pub global_settings: CircuitBreakerGlobalSettings,

    /// Applies to every queue without an explicit entry
    pub default_config: QueueCircuitBreakerConfig,

    /// Per-queue overrides keyed by queue name
    #[serde(default)]
    pub queue_configs: HashMap<String, QueueCircuitBreakerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerGlobalSettings {
    /// Registry size above which new breakers are logged as suspicious
    pub max_circuit_breakers: usize,
}

/// Circuit breaker thresholds for one queue
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueueCircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub exceptions_allowed_before_breaking: u32,

    /// Seconds the circuit stays open before a probe is allowed
    pub duration_of_break_seconds: u64,
}

/// In-process broker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InMemoryConfig {
    /// Deliveries attempted before a message is dead-lettered
    pub max_delivery_count: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is not set (e.g. "info,pirina_transport=debug")
    pub level: Option<String>,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_environment() -> String {
    "development".to_string()
}

impl TransportConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.connection.connection_string.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "connection.connection_string",
                "connection configuration",
            ));
        }

        self.circuit_breakers
            .global_settings
            .to_resilience_config()
            .validate()
            .map_err(|reason| {
                ConfigurationError::invalid_value(
                    "circuit_breakers.global_settings.max_circuit_breakers",
                    self.circuit_breakers
                        .global_settings
                        .max_circuit_breakers
                        .to_string(),
                    reason,
                )
            })?;

        self.circuit_breakers
            .default_config
            .validate("circuit_breakers.default_config")?;

        for (queue_name, queue_config) in &self.circuit_breakers.queue_configs {
            queue_config.validate(&format!("circuit_breakers.queue_configs.{queue_name}"))?;
        }

        if self.in_memory.max_delivery_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "in_memory.max_delivery_count",
                "0",
                "max delivery count must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl ConnectionStringProvider for TransportConfig {
    fn connection_string(&self) -> String {
        self.connection.connection_string.clone()
    }
}

impl CircuitBreakersConfig {
    /// Get configuration for a specific queue
    pub fn config_for_queue(&self, queue_name: &str) -> QueueCircuitBreakerConfig {
        self.queue_configs
            .get(queue_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }
}

impl QueueCircuitBreakerConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            self.exceptions_allowed_before_breaking,
            Duration::from_secs(self.duration_of_break_seconds),
        )
    }

    fn validate(&self, field_prefix: &str) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| {
            ConfigurationError::invalid_value(
                field_prefix,
                format!(
                    "{} failures / {}s",
                    self.exceptions_allowed_before_breaking, self.duration_of_break_seconds
                ),
                reason,
            )
        };

        self.to_resilience_config().validate().map_err(invalid)?;

        if self.exceptions_allowed_before_breaking > MAX_CONFIGURED_THRESHOLD {
            return Err(invalid(format!(
                "exceptions_allowed_before_breaking should not exceed {MAX_CONFIGURED_THRESHOLD}"
            )));
        }

        Ok(())
    }
}

impl CircuitBreakerGlobalSettings {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> GlobalCircuitBreakerSettings {
        GlobalCircuitBreakerSettings {
            max_circuit_breakers: self.max_circuit_breakers,
        }
    }
}

impl Default for TransportConfig {
    /// Safe fallback configuration targeting the in-process broker
    fn default() -> Self {
        Self {
            connection: ConnectionConfig {
                connection_string: "inmemory://localhost".to_string(),
            },
            circuit_breakers: CircuitBreakersConfig::default(),
            in_memory: InMemoryConfig::default(),
            logging: LoggingConfig::default(),
            environment: default_environment(),
        }
    }
}

impl Default for CircuitBreakersConfig {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            enabled: true,
            global_settings: CircuitBreakerGlobalSettings::default(),
            default_config: QueueCircuitBreakerConfig {
                exceptions_allowed_before_breaking: defaults.exceptions_allowed_before_breaking,
                duration_of_break_seconds: defaults.duration_of_break.as_secs(),
            },
            queue_configs: HashMap::new(),
        }
    }
}

impl Default for CircuitBreakerGlobalSettings {
    fn default() -> Self {
        Self {
            max_circuit_breakers: GlobalCircuitBreakerSettings::default().max_circuit_breakers,
        }
    }
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_delivery_count: 10,
        }
    }
}
