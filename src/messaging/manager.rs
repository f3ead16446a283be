//! # Transport Manager
//!
//! Owns one channel for its lifetime. Every outbound send goes through the
//! queue's circuit breaker; inbound payloads fan out to the listeners
//! registered on the channel configuration.
//!
//! Lifecycle is two-phase: `build()` wires collaborators and subscribes to
//! breaker notifications, `initialise()`/`start()` touch the channel.

use crate::logging::{EventId, EventLogger, Severity};
use crate::messaging::{
    MessageListener, MessagingError, MessagingResult, TransportChannel, TransportConfiguration,
};
use crate::resilience::{CircuitBreaker, CircuitBreakerEvent, SubscriptionId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const SOURCE: &str = "TransportManager";
const SEND_FAILURE_MESSAGE: &str = "Message queuing failure due to Circuit Breaker";

/// Circuit-breaker gated manager for a single queue
pub struct TransportManager {
    queue_name: String,
    channel: Arc<dyn TransportChannel>,
    circuit_breaker: Arc<CircuitBreaker>,
    event_logger: Arc<dyn EventLogger>,
    subscription: SubscriptionId,
    initialised: AtomicBool,
    running: AtomicBool,
}

/// Builder for `TransportManager`; every collaborator is required
#[derive(Default)]
pub struct TransportManagerBuilder {
    channel: Option<Arc<dyn TransportChannel>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    event_logger: Option<Arc<dyn EventLogger>>,
}

impl TransportManagerBuilder {
    pub fn channel(mut self, channel: Arc<dyn TransportChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub fn event_logger(mut self, event_logger: Arc<dyn EventLogger>) -> Self {
        self.event_logger = Some(event_logger);
        self
    }

    /// Build the manager and subscribe it to the breaker's notifications
    pub fn build(self) -> MessagingResult<TransportManager> {
        let channel = self.channel.ok_or_else(|| {
            MessagingError::invalid_argument("channel", "a transport channel must be provided")
        })?;
        let circuit_breaker = self.circuit_breaker.ok_or_else(|| {
            MessagingError::invalid_argument("circuit_breaker", "a circuit breaker must be provided")
        })?;
        let event_logger = self.event_logger.ok_or_else(|| {
            MessagingError::invalid_argument("event_logger", "an event logger must be provided")
        })?;

        let queue_name = channel.configuration().queue_name().to_string();

        let observer_queue = queue_name.clone();
        let observer_logger = Arc::clone(&event_logger);
        let subscription = circuit_breaker.subscribe(Arc::new(move |event: &CircuitBreakerEvent| {
            log_breaker_event(observer_logger.as_ref(), &observer_queue, event);
        }));

        debug!(
            queue_name = %queue_name,
            mode = %channel.configuration().mode(),
            "Transport manager built"
        );

        Ok(TransportManager {
            queue_name,
            channel,
            circuit_breaker,
            event_logger,
            subscription,
            initialised: AtomicBool::new(false),
            running: AtomicBool::new(false),
        })
    }
}

fn log_breaker_event(logger: &dyn EventLogger, queue_name: &str, event: &CircuitBreakerEvent) {
    match event {
        CircuitBreakerEvent::Opened {
            break_duration,
            trigger,
            ..
        } => logger.log(
            Severity::Warning,
            EventId::CircuitBreakerOpened,
            SOURCE,
            &format!(
                "Circuit Breaker opened on queue '{queue_name}' for duration of {break_duration:?} due to {trigger}"
            ),
        ),
        CircuitBreakerEvent::Reset { .. } => logger.log(
            Severity::Info,
            EventId::CircuitBreakerReset,
            SOURCE,
            &format!("Circuit Breaker on queue '{queue_name}' reset"),
        ),
    }
}

impl TransportManager {
    pub fn builder() -> TransportManagerBuilder {
        TransportManagerBuilder::default()
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn configuration(&self) -> &TransportConfiguration {
        self.channel.configuration()
    }

    pub fn channel(&self) -> &Arc<dyn TransportChannel> {
        &self.channel
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Prepare the channel (Uninitialised -> Ready)
    pub async fn initialise(&self, cancellation: &CancellationToken) -> MessagingResult<()> {
        self.channel.initialise(cancellation).await?;

        if !self.initialised.swap(true, Ordering::AcqRel) {
            self.event_logger.log(
                Severity::Debug,
                EventId::TransportInitialised,
                SOURCE,
                &format!("TransportManager initialised for queue '{}'", self.queue_name),
            );
        }
        Ok(())
    }

    /// Start the channel, initialising it first if needed
    pub async fn start(&self, cancellation: &CancellationToken) -> MessagingResult<()> {
        if !self.is_initialised() {
            self.initialise(cancellation).await?;
        }

        self.channel.start(cancellation).await?;
        self.running.store(true, Ordering::Release);

        self.event_logger.log(
            Severity::Info,
            EventId::TransportStarted,
            SOURCE,
            "TransportManager started",
        );
        Ok(())
    }

    /// Stop the channel; structural state (listeners, breaker) is kept
    pub async fn stop(&self, cancellation: &CancellationToken) -> MessagingResult<()> {
        self.channel.stop(cancellation).await?;
        self.running.store(false, Ordering::Release);

        self.event_logger.log(
            Severity::Info,
            EventId::TransportStopped,
            SOURCE,
            "TransportManager stopped",
        );
        Ok(())
    }

    /// Send raw bytes through the circuit breaker
    ///
    /// Any breaker-reported failure (channel error or open circuit) surfaces
    /// as `MessageSendFailure` wrapping the cause. No retries happen here.
    pub async fn enqueue_message(
        &self,
        payload: Vec<u8>,
        cancellation: &CancellationToken,
    ) -> MessagingResult<()> {
        let channel = Arc::clone(&self.channel);
        let queue_name = self.queue_name.clone();
        let event_logger = Arc::clone(&self.event_logger);

        self.circuit_breaker
            .execute(
                move |token| async move { channel.send(payload, &token).await },
                move |error| async move {
                    let cause = MessagingError::from(error);
                    event_logger.log(
                        Severity::Error,
                        EventId::MessageSendFailed,
                        SOURCE,
                        &format!("Send to queue '{queue_name}' failed: {cause}"),
                    );
                    Err(MessagingError::message_send_failure(
                        queue_name,
                        SEND_FAILURE_MESSAGE,
                        cause,
                    ))
                },
                cancellation,
            )
            .await
    }

    /// Append a listener to the channel's listener list (ordered, duplicates kept)
    pub fn register_listener(&self, listener: Arc<dyn MessageListener>) {
        self.configuration().register_listener(listener);
        info!(
            queue_name = %self.queue_name,
            listener_count = self.listener_count(),
            "👂 Listener registered on transport manager"
        );
    }

    pub fn listener_count(&self) -> usize {
        self.configuration().listener_count()
    }

    /// Inbound fan-out to every registered listener, in registration order
    pub async fn deliver(
        &self,
        payload: &[u8],
        cancellation: &CancellationToken,
    ) -> MessagingResult<usize> {
        self.configuration().deliver(payload, cancellation).await
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.circuit_breaker.unsubscribe(self.subscription);
    }
}

impl fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportManager")
            .field("queue_name", &self.queue_name)
            .field("channel", &self.channel)
            .field("circuit_state", &self.circuit_breaker.state())
            .field("initialised", &self.is_initialised())
            .field("running", &self.is_running())
            .finish()
    }
}
