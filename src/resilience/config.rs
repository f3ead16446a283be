//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single circuit breaker and for the registry
//! that hands breakers out per queue. The YAML-facing shapes live in
//! `crate::config` and convert into these.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures that opens the circuit
    pub exceptions_allowed_before_breaking: u32,

    /// Time the circuit stays open before a half-open probe is let through
    pub duration_of_break: Duration,
}

impl CircuitBreakerConfig {
    /// Create a configuration with explicit threshold and break duration
    pub fn new(exceptions_allowed_before_breaking: u32, duration_of_break: Duration) -> Self {
        Self {
            exceptions_allowed_before_breaking,
            duration_of_break,
        }
    }

    /// Validate the values a breaker cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.exceptions_allowed_before_breaking == 0 {
            return Err("exceptions_allowed_before_breaking must be greater than 0".to_string());
        }

        if self.duration_of_break.is_zero() {
            return Err("duration_of_break must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            exceptions_allowed_before_breaking: 5,
            duration_of_break: Duration::from_secs(5 * 60),
        }
    }
}

/// Global settings for the circuit breaker registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalCircuitBreakerSettings {
    /// Maximum number of circuit breakers before the registry starts warning
    pub max_circuit_breakers: usize,
}

impl GlobalCircuitBreakerSettings {
    /// Validate global settings
    pub fn validate(&self) -> Result<(), String> {
        if self.max_circuit_breakers == 0 {
            return Err("max_circuit_breakers must be greater than 0".to_string());
        }

        if self.max_circuit_breakers > 1000 {
            return Err("max_circuit_breakers should not exceed 1000".to_string());
        }

        Ok(())
    }
}

impl Default for GlobalCircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_circuit_breakers: 50,
        }
    }
}
