//! # Circuit Breaker Notifications
//!
//! Opened/Reset notifications are delivered two ways: synchronously to
//! registered observers (used by the transport manager for logging) and
//! through a broadcast stream for async consumers. Observers must be
//! unsubscribed by whoever registered them.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// State transition notification raised by a circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitBreakerEvent {
    /// The circuit opened; calls short-circuit for `break_duration`
    Opened {
        component: String,
        break_duration: Duration,
        /// Display form of the error that tripped the circuit
        trigger: String,
    },
    /// A half-open probe succeeded and the circuit closed again
    Reset { component: String },
}

impl CircuitBreakerEvent {
    pub fn component(&self) -> &str {
        match self {
            Self::Opened { component, .. } | Self::Reset { component } => component,
        }
    }

    pub fn is_opened(&self) -> bool {
        matches!(self, Self::Opened { .. })
    }
}

/// Receives circuit breaker notifications synchronously on the calling task
pub trait CircuitBreakerObserver: Send + Sync {
    fn on_event(&self, event: &CircuitBreakerEvent);
}

impl<F> CircuitBreakerObserver for F
where
    F: Fn(&CircuitBreakerEvent) + Send + Sync,
{
    fn on_event(&self, event: &CircuitBreakerEvent) {
        self(event)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

/// Observer list plus broadcast channel owned by one circuit breaker
pub(crate) struct CircuitBreakerEvents {
    next_id: AtomicU64,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn CircuitBreakerObserver>)>>,
    sender: broadcast::Sender<CircuitBreakerEvent>,
}

impl CircuitBreakerEvents {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            next_id: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub(crate) fn subscribe(&self, observer: Arc<dyn CircuitBreakerObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    pub(crate) fn stream(&self) -> broadcast::Receiver<CircuitBreakerEvent> {
        self.sender.subscribe()
    }

    /// Deliver to observers (snapshot, so observers may unsubscribe while notified)
    pub(crate) fn notify(&self, event: CircuitBreakerEvent) {
        let observers: Vec<Arc<dyn CircuitBreakerObserver>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer.on_event(&event);
        }

        // No receivers is fine
        let _ = self.sender.send(event);
    }
}

impl fmt::Debug for CircuitBreakerEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerEvents")
            .field("observers", &self.observer_count())
            .field("stream_receivers", &self.sender.receiver_count())
            .finish()
    }
}
