//! # Circuit Breaker Registry
//!
//! Hands out one circuit breaker per queue, built from the per-queue
//! overrides in configuration. Provides centralized control and metrics
//! aggregation across queues.

use crate::config::{CircuitBreakersConfig, ConfigResult};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
    SystemCircuitBreakerMetrics,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Registry of circuit breakers keyed by component (queue) name
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    circuit_breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,

    config: CircuitBreakersConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry from the `circuit_breakers` configuration section
    pub fn from_config(config: &CircuitBreakersConfig) -> Self {
        info!(
            enabled = config.enabled,
            queue_overrides = config.queue_configs.len(),
            "🛡️ Initializing circuit breaker registry"
        );

        Self {
            circuit_breakers: Arc::new(RwLock::new(HashMap::new())),
            config: config.clone(),
        }
    }

    /// Resolve the breaker configuration for a component
    ///
    /// With breakers disabled the threshold is unreachable, so the circuit never opens.
    pub fn config_for(&self, component_name: &str) -> CircuitBreakerConfig {
        let configured = self
            .config
            .config_for_queue(component_name)
            .to_resilience_config();

        if self.config.enabled {
            configured
        } else {
            CircuitBreakerConfig::new(u32::MAX, Duration::from_secs(1))
        }
    }

    /// Get or create circuit breaker for a component
    pub async fn get_circuit_breaker(
        &self,
        component_name: &str,
    ) -> ConfigResult<Arc<CircuitBreaker>> {
        {
            let breakers = self.circuit_breakers.read().await;
            if let Some(breaker) = breakers.get(component_name) {
                return Ok(Arc::clone(breaker));
            }
        }

        let mut breakers = self.circuit_breakers.write().await;

        // Double-check: another task may have created it meanwhile
        if let Some(breaker) = breakers.get(component_name) {
            return Ok(Arc::clone(breaker));
        }

        if breakers.len() >= self.config.global_settings.max_circuit_breakers {
            warn!(
                component = component_name,
                current_count = breakers.len(),
                max_allowed = self.config.global_settings.max_circuit_breakers,
                "🚨 Maximum circuit breaker count reached, creating anyway"
            );
        }

        let breaker = Arc::new(CircuitBreaker::new(
            component_name,
            self.config_for(component_name),
        )?);

        breakers.insert(component_name.to_string(), Arc::clone(&breaker));

        info!(
            component = component_name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        Ok(breaker)
    }

    /// Get all circuit breaker names
    pub async fn list_components(&self) -> Vec<String> {
        let breakers = self.circuit_breakers.read().await;
        let mut names: Vec<String> = breakers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get metrics for a specific circuit breaker
    pub async fn get_component_metrics(
        &self,
        component_name: &str,
    ) -> Option<CircuitBreakerMetrics> {
        let breakers = self.circuit_breakers.read().await;
        breakers.get(component_name).map(|breaker| breaker.metrics())
    }

    /// Get system-wide circuit breaker metrics
    pub async fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        let breakers = self.circuit_breakers.read().await;
        for (name, breaker) in breakers.iter() {
            system_metrics.add_circuit_breaker(name.clone(), breaker.metrics());
        }

        system_metrics
    }

    /// Force open all circuit breakers (emergency stop)
    pub async fn force_open_all(&self) {
        warn!("🚨 Forcing all circuit breakers open (emergency stop)");

        let breakers = self.circuit_breakers.read().await;
        for breaker in breakers.values() {
            breaker.force_open();
        }
    }

    /// Force close all circuit breakers (emergency recovery)
    pub async fn force_close_all(&self) {
        warn!("🚨 Forcing all circuit breakers closed (emergency recovery)");

        let breakers = self.circuit_breakers.read().await;
        for breaker in breakers.values() {
            breaker.force_closed();
        }
    }

    /// Get count of circuit breakers by state
    pub async fn get_state_summary(&self) -> HashMap<CircuitState, usize> {
        self.get_system_metrics().await.count_by_state()
    }

    /// Overall health based on circuit breaker states (1.0 = all healthy)
    pub async fn system_health_score(&self) -> f64 {
        self.get_system_metrics().await.health_score()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::from_config(&CircuitBreakersConfig::default())
    }
}
