//! # Circuit Breaker Implementation
//!
//! Consecutive-failure circuit breaker guarding the send path of a queue.
//! Three states: Closed (normal operation), Open (failing fast) and
//! Half-Open (a single probe call decides whether to close or re-open).
//!
//! Every call raises at most one transition notification: `Opened` when the
//! call's failure trips the circuit, `Reset` when a successful probe closes it.

use crate::config::{ConfigResult, ConfigurationError};
use crate::resilience::events::{
    CircuitBreakerEvent, CircuitBreakerEvents, CircuitBreakerObserver, SubscriptionId,
};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_STREAM_CAPACITY: usize = 64;

/// Lock-free counters for call outcomes.
///
/// Transition bookkeeping lives behind `BreakerCore`; these are only bumped.
#[derive(Debug)]
struct AtomicCallMetrics {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    short_circuited_count: AtomicU64,
    total_duration_nanos: AtomicU64,
}

impl AtomicCallMetrics {
    fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            short_circuited_count: AtomicU64::new(0),
            total_duration_nanos: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_short_circuit(&self) {
        self.short_circuited_count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, core: &BreakerCore) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_duration_nanos = self.total_duration_nanos.load(Ordering::Relaxed);

        let (failure_rate, success_rate, average_duration) = if total_calls > 0 {
            let fr = failure_count as f64 / total_calls as f64;
            let sr = success_count as f64 / total_calls as f64;
            let avg = if success_count > 0 {
                Duration::from_nanos(total_duration_nanos / success_count)
            } else {
                Duration::ZERO
            };
            (fr, sr, avg)
        } else {
            (0.0, 0.0, Duration::ZERO)
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            short_circuited_count: self.short_circuited_count.load(Ordering::Relaxed),
            consecutive_failures: core.consecutive_failures,
            opened_count: core.opened_count,
            reset_count: core.reset_count,
            total_duration: Duration::from_nanos(total_duration_nanos),
            current_state: core.state,
            failure_rate,
            success_rate,
            average_duration,
        }
    }
}

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - exactly one probe call is allowed through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not run
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran and failed; the failure was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the action was skipped because the circuit was open
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// State guarded together so a transition and its notification stay paired
#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u64,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    opened_count: u64,
    reset_count: u64,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
            opened_count: 0,
            reset_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Allowed,
    Probe,
    Rejected,
}

/// Releases the half-open probe slot if the probe future is dropped mid-flight
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl ProbeGuard<'_> {
    fn disarm(&mut self) -> bool {
        std::mem::replace(&mut self.armed, false)
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.core.lock().probe_in_flight = false;
            debug!(component = %self.breaker.name, "Half-open probe abandoned before completion");
        }
    }
}

/// Consecutive-failure circuit breaker with observer notifications
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics (the queue name on the send path)
    name: String,

    config: CircuitBreakerConfig,

    core: Mutex<BreakerCore>,

    metrics: AtomicCallMetrics,

    events: CircuitBreakerEvents,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    ///
    /// A zero threshold or zero break duration is rejected.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        let name = name.into();
        config.validate().map_err(|reason| {
            ConfigurationError::invalid_value(
                format!("circuit_breakers.{name}"),
                format!(
                    "{} failures / {:?}",
                    config.exceptions_allowed_before_breaking, config.duration_of_break
                ),
                reason,
            )
        })?;

        info!(
            component = %name,
            exceptions_allowed_before_breaking = config.exceptions_allowed_before_breaking,
            duration_of_break_ms = config.duration_of_break.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Ok(Self {
            name,
            config,
            core: Mutex::new(BreakerCore::new()),
            metrics: AtomicCallMetrics::new(),
            events: CircuitBreakerEvents::new(EVENT_STREAM_CAPACITY),
        })
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Returns `CircuitOpen` without running `operation` while the circuit is
    /// open or while another call holds the half-open probe slot.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let admission = self.admit();
        if admission == Admission::Rejected {
            self.metrics.record_short_circuit();
            debug!(component = %self.name, "🛡️ Circuit open, call short-circuited");
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let mut probe = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();
        let was_probe = probe.disarm();

        match &result {
            Ok(_) => self.record_success(duration, was_probe),
            Err(error) => self.record_failure(duration, was_probe, error.to_string()),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Run `action` under the breaker, routing any failure to `on_failure`
    ///
    /// `on_failure` receives `OperationFailed` with the action's error, or
    /// `CircuitOpen` when the action was skipped. The cancellation token is
    /// handed to the action untouched.
    pub async fn execute<T, E, R, A, AFut, H, HFut>(
        &self,
        action: A,
        on_failure: H,
        cancellation: &CancellationToken,
    ) -> Result<T, R>
    where
        A: FnOnce(CancellationToken) -> AFut,
        AFut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        H: FnOnce(CircuitBreakerError<E>) -> HFut,
        HFut: Future<Output = Result<T, R>>,
    {
        let token = cancellation.clone();
        match self.call(move || action(token)).await {
            Ok(value) => Ok(value),
            Err(error) => on_failure(error).await,
        }
    }

    fn admit(&self) -> Admission {
        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let break_elapsed = core
                    .opened_at
                    .map_or(true, |opened_at| {
                        opened_at.elapsed() >= self.config.duration_of_break
                    });

                if break_elapsed {
                    core.state = CircuitState::HalfOpen;
                    core.probe_in_flight = true;
                    info!(component = %self.name, "🟡 Circuit breaker half-open (probing recovery)");
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if core.probe_in_flight {
                    Admission::Rejected
                } else {
                    core.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    fn record_success(&self, duration: Duration, was_probe: bool) {
        self.metrics.record_success(duration);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        let event = {
            let mut core = self.core.lock();
            if was_probe {
                core.probe_in_flight = false;
            }

            match core.state {
                CircuitState::HalfOpen if was_probe => {
                    core.state = CircuitState::Closed;
                    core.consecutive_failures = 0;
                    core.opened_at = None;
                    core.reset_count += 1;
                    Some(CircuitBreakerEvent::Reset {
                        component: self.name.clone(),
                    })
                }
                CircuitState::Closed | CircuitState::HalfOpen => {
                    core.consecutive_failures = 0;
                    None
                }
                CircuitState::Open => {
                    warn!(component = %self.name, "Success recorded while circuit is open");
                    None
                }
            }
        };

        if let Some(event) = event {
            info!(component = %self.name, "🟢 Circuit breaker closed (recovered)");
            self.events.notify(event);
        }
    }

    fn record_failure(&self, duration: Duration, was_probe: bool, trigger: String) {
        self.metrics.record_failure(duration);

        error!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            error = %trigger,
            "Operation failed"
        );

        let opened = {
            let mut core = self.core.lock();
            if was_probe {
                core.probe_in_flight = false;
            }
            core.consecutive_failures += 1;

            let should_open = match core.state {
                CircuitState::Closed => {
                    core.consecutive_failures
                        >= u64::from(self.config.exceptions_allowed_before_breaking)
                }
                CircuitState::HalfOpen => was_probe,
                CircuitState::Open => false,
            };

            if should_open {
                core.state = CircuitState::Open;
                core.opened_at = Some(Instant::now());
                core.opened_count += 1;
                Some(core.consecutive_failures)
            } else {
                None
            }
        };

        if let Some(consecutive_failures) = opened {
            error!(
                component = %self.name,
                consecutive_failures = consecutive_failures,
                exceptions_allowed_before_breaking = self.config.exceptions_allowed_before_breaking,
                duration_of_break_ms = self.config.duration_of_break.as_millis() as u64,
                "🔴 Circuit breaker opened (failing fast)"
            );
            self.events.notify(CircuitBreakerEvent::Opened {
                component: self.name.clone(),
                break_duration: self.config.duration_of_break,
                trigger,
            });
        }
    }

    /// Force circuit to open state for one break duration (operator action, no notification)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut core = self.core.lock();
        core.state = CircuitState::Open;
        core.opened_at = Some(Instant::now());
        core.probe_in_flight = false;
    }

    /// Force circuit to closed state (operator action, no notification)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut core = self.core.lock();
        core.state = CircuitState::Closed;
        core.consecutive_failures = 0;
        core.opened_at = None;
        core.probe_in_flight = false;
    }

    /// Register an observer for Opened/Reset notifications
    pub fn subscribe(&self, observer: Arc<dyn CircuitBreakerObserver>) -> SubscriptionId {
        let id = self.events.subscribe(observer);
        debug!(component = %self.name, subscription = %id, "Circuit breaker observer subscribed");
        id
    }

    /// Remove an observer; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.events.unsubscribe(id);
        debug!(component = %self.name, subscription = %id, removed, "Circuit breaker observer unsubscribed");
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.events.observer_count()
    }

    /// Stream of notifications raised after this call
    pub fn event_stream(&self) -> broadcast::Receiver<CircuitBreakerEvent> {
        self.events.stream()
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let core = self.core.lock();
        self.metrics.snapshot(&core)
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check if circuit breaker is healthy (closed with a low failure rate)
    pub fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }
}
