//! # In-Memory Transport
//!
//! In-process queue broker implementing `TransportChannel`, for development
//! and testing.
//!
//! ## Features
//!
//! - **Competing Consumers**: each message goes to one receiving channel of its queue
//! - **Ordered Fan-out**: a received message is handed to every listener of that channel in order
//! - **Redelivery**: a message is completed only when at least one listener ran and
//!   none failed; otherwise it is requeued until `max_delivery_count`, then dead-lettered
//! - **Statistics**: per-queue counters and dead-letter inspection

use crate::config::InMemoryConfig;
use crate::logging::{EventId, EventLogger, Severity, TracingEventLogger};
use crate::messaging::{
    ChannelFactory, MessagingError, MessagingResult, TransportChannel, TransportConfiguration,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Id of the channel whose receive loop is running on the current task
    static PUMP_CHANNEL: u64;
}

/// Message as stored by the broker
#[derive(Debug, Clone)]
struct BrokeredMessage {
    id: u64,
    payload: Vec<u8>,
    /// Number of times this message has been handed to a channel
    delivery_count: u32,
}

/// A message that exhausted its deliveries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message_id: u64,
    pub payload: Vec<u8>,
    pub delivery_count: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Per-queue counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub sent: u64,
    /// Deliveries, including redeliveries
    pub delivered: u64,
    pub completed: u64,
    pub dead_lettered: u64,
    /// Messages waiting for a receiver
    pub pending: u64,
}

#[derive(Debug, Default)]
struct QueueCounters {
    sent: AtomicU64,
    delivered: AtomicU64,
    completed: AtomicU64,
    dead_lettered: AtomicU64,
    pending: AtomicU64,
}

/// One named queue; receivers compete for its messages
struct BrokerQueue {
    name: String,
    sender: mpsc::UnboundedSender<BrokeredMessage>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<BrokeredMessage>>,
    next_id: AtomicU64,
    counters: QueueCounters,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl BrokerQueue {
    fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            next_id: AtomicU64::new(1),
            counters: QueueCounters::default(),
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    fn enqueue(&self, payload: Vec<u8>) -> MessagingResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.push(BrokeredMessage {
            id,
            payload,
            delivery_count: 0,
        })?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn push(&self, message: BrokeredMessage) -> MessagingResult<()> {
        // Count before sending so a fast receiver never sees pending underflow
        self.counters.pending.fetch_add(1, Ordering::AcqRel);
        self.sender.send(message).map_err(|_| {
            self.counters.pending.fetch_sub(1, Ordering::AcqRel);
            MessagingError::channel_operation(&self.name, "send", "queue is closed")
        })
    }

    /// Wait for the next message (cancel-safe)
    async fn receive(&self) -> Option<BrokeredMessage> {
        let mut receiver = self.receiver.lock().await;
        let mut message = receiver.recv().await?;
        drop(receiver);

        self.counters.pending.fetch_sub(1, Ordering::AcqRel);
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        message.delivery_count += 1;
        Some(message)
    }

    fn complete(&self, message: &BrokeredMessage) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        debug!(queue_name = %self.name, message_id = message.id, "✅ Message completed");
    }

    /// Requeue, or dead-letter once deliveries are exhausted; returns true if dead-lettered
    fn abandon(&self, message: BrokeredMessage, reason: String, max_delivery_count: u32) -> bool {
        if message.delivery_count < max_delivery_count {
            debug!(
                queue_name = %self.name,
                message_id = message.id,
                delivery_count = message.delivery_count,
                reason = %reason,
                "🔁 Message abandoned, requeueing"
            );
            if self.push(message.clone()).is_ok() {
                return false;
            }
        }

        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
        self.dead_letters.lock().push(DeadLetter {
            message_id: message.id,
            payload: message.payload,
            delivery_count: message.delivery_count,
            reason,
            dead_lettered_at: Utc::now(),
        });
        true
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            queue_name: self.name.clone(),
            sent: self.counters.sent.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
            pending: self.counters.pending.load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for BrokerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerQueue")
            .field("name", &self.name)
            .field("stats", &self.stats())
            .finish()
    }
}

/// In-process broker holding named queues
///
/// # Example
///
/// ```rust
/// use pirina_transport::messaging::in_memory::InMemoryBroker;
/// use pirina_transport::messaging::{
///     TransportChannel, TransportConfiguration, TransportConnection, TransportMode,
/// };
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = Arc::new(InMemoryBroker::new(10));
/// let channel = broker.channel(TransportConfiguration::new(
///     TransportConnection::new("inmemory://localhost", "orders"),
///     TransportMode::SendOnly,
/// ));
///
/// let token = CancellationToken::new();
/// channel.start(&token).await?;
/// channel.send(b"hello".to_vec(), &token).await?;
///
/// assert_eq!(broker.queue_stats("orders").map(|s| s.sent), Some(1));
/// # Ok(())
/// # }
/// ```
pub struct InMemoryBroker {
    queues: DashMap<String, Arc<BrokerQueue>>,
    max_delivery_count: u32,
    event_logger: Arc<dyn EventLogger>,
}

impl InMemoryBroker {
    pub fn new(max_delivery_count: u32) -> Self {
        Self {
            queues: DashMap::new(),
            max_delivery_count: max_delivery_count.max(1),
            event_logger: Arc::new(TracingEventLogger),
        }
    }

    pub fn from_config(config: &InMemoryConfig) -> Self {
        Self::new(config.max_delivery_count)
    }

    pub fn with_event_logger(mut self, event_logger: Arc<dyn EventLogger>) -> Self {
        self.event_logger = event_logger;
        self
    }

    pub fn max_delivery_count(&self) -> u32 {
        self.max_delivery_count
    }

    /// Create a channel on this broker (not yet initialised)
    pub fn channel(self: &Arc<Self>, configuration: TransportConfiguration) -> Arc<InMemoryChannel> {
        Arc::new(InMemoryChannel {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            configuration: Arc::new(configuration),
            broker: Arc::clone(self),
            queue: OnceLock::new(),
            running: AtomicBool::new(false),
            pump: Mutex::new(None),
        })
    }

    /// Get or create a queue (idempotent)
    fn ensure_queue(&self, queue_name: &str) -> Arc<BrokerQueue> {
        Arc::clone(
            self.queues
                .entry(queue_name.to_string())
                .or_insert_with(|| {
                    info!(queue_name = %queue_name, "📦 In-memory queue created");
                    Arc::new(BrokerQueue::new(queue_name))
                })
                .value(),
        )
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn queue_stats(&self, queue_name: &str) -> Option<QueueStats> {
        self.queues.get(queue_name).map(|queue| queue.stats())
    }

    pub fn dead_letters(&self, queue_name: &str) -> Vec<DeadLetter> {
        self.queues
            .get(queue_name)
            .map(|queue| queue.dead_letters.lock().clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::from_config(&InMemoryConfig::default())
    }
}

impl fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("queues", &self.queue_names())
            .field("max_delivery_count", &self.max_delivery_count)
            .finish()
    }
}

struct PumpHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// `TransportChannel` backed by an `InMemoryBroker` queue
pub struct InMemoryChannel {
    id: u64,
    configuration: Arc<TransportConfiguration>,
    broker: Arc<InMemoryBroker>,
    queue: OnceLock<Arc<BrokerQueue>>,
    running: AtomicBool,
    pump: Mutex<Option<PumpHandle>>,
}

impl InMemoryChannel {
    fn queue_name(&self) -> &str {
        self.configuration.queue_name()
    }

    fn spawn_pump(&self, queue: Arc<BrokerQueue>) -> PumpHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(PUMP_CHANNEL.scope(
            self.id,
            run_pump(
                Arc::clone(&self.configuration),
                queue,
                self.broker.max_delivery_count,
                Arc::clone(&self.broker.event_logger),
                shutdown.clone(),
            ),
        ));
        PumpHandle { shutdown, task }
    }

    /// Whether the caller is running inside this channel's own receive loop
    fn on_own_pump(&self) -> bool {
        PUMP_CHANNEL.try_with(|id| *id == self.id).unwrap_or(false)
    }
}

/// Receive loop for one channel; exits when `shutdown` is cancelled
async fn run_pump(
    configuration: Arc<TransportConfiguration>,
    queue: Arc<BrokerQueue>,
    max_delivery_count: u32,
    event_logger: Arc<dyn EventLogger>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = queue.receive() => message,
        };

        let Some(message) = message else { break };

        let failure = match configuration.deliver(&message.payload, &shutdown).await {
            Ok(0) => Some("no listeners registered".to_string()),
            Ok(_) => None,
            Err(error) => {
                warn!(
                    queue_name = %queue.name,
                    message_id = message.id,
                    delivery_count = message.delivery_count,
                    error = %error,
                    "Listener failed to process message"
                );
                Some(error.to_string())
            }
        };

        match failure {
            None => queue.complete(&message),
            Some(reason) => {
                let message_id = message.id;
                if queue.abandon(message, reason.clone(), max_delivery_count) {
                    event_logger.log(
                        Severity::Warning,
                        EventId::MessageDeadLettered,
                        "InMemoryChannel",
                        &format!(
                            "Message {message_id} on queue '{}' dead-lettered: {reason}",
                            queue.name
                        ),
                    );
                }
                tokio::task::yield_now().await;
            }
        }
    }

    debug!(queue_name = %queue.name, "In-memory receive loop stopped");
}

#[async_trait]
impl TransportChannel for InMemoryChannel {
    fn configuration(&self) -> &TransportConfiguration {
        &self.configuration
    }

    async fn initialise(&self, cancellation: &CancellationToken) -> MessagingResult<()> {
        if cancellation.is_cancelled() {
            return Err(MessagingError::cancelled("initialise"));
        }

        self.queue
            .get_or_init(|| self.broker.ensure_queue(self.queue_name()));
        Ok(())
    }

    async fn start(&self, cancellation: &CancellationToken) -> MessagingResult<()> {
        self.initialise(cancellation).await?;

        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if self.configuration.mode().can_receive() {
            if let Some(queue) = self.queue.get() {
                let handle = self.spawn_pump(Arc::clone(queue));
                *self.pump.lock() = Some(handle);
            }
        }

        info!(
            queue_name = %self.queue_name(),
            mode = %self.configuration.mode(),
            "▶️ In-memory channel started"
        );
        Ok(())
    }

    async fn stop(&self, _cancellation: &CancellationToken) -> MessagingResult<()> {
        self.running.store(false, Ordering::Release);

        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.shutdown.cancel();
            if self.on_own_pump() {
                // Stopped from a listener: the loop exits once this delivery returns
                debug!(queue_name = %self.queue_name(), "Stop requested from receive loop");
            } else if let Err(join_error) = pump.task.await {
                warn!(queue_name = %self.queue_name(), error = %join_error, "Receive loop ended abnormally");
            }
        }

        info!(queue_name = %self.queue_name(), "⏹️ In-memory channel stopped");
        Ok(())
    }

    async fn send(&self, payload: Vec<u8>, cancellation: &CancellationToken) -> MessagingResult<()> {
        if !self.configuration.mode().can_send() {
            return Err(MessagingError::channel_operation(
                self.queue_name(),
                "send",
                format!("channel is {}", self.configuration.mode()),
            ));
        }

        if !self.is_running() {
            return Err(MessagingError::channel_operation(
                self.queue_name(),
                "send",
                "channel is not started",
            ));
        }

        if cancellation.is_cancelled() {
            return Err(MessagingError::cancelled("send"));
        }

        let queue = self.queue.get().ok_or_else(|| {
            MessagingError::channel_operation(self.queue_name(), "send", "channel is not initialised")
        })?;

        let message_id = queue.enqueue(payload)?;
        debug!(queue_name = %self.queue_name(), message_id, "Message enqueued");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.shutdown.cancel();
        }
    }
}

impl fmt::Debug for InMemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryChannel")
            .field("configuration", &self.configuration)
            .field("running", &self.is_running())
            .finish()
    }
}

/// `ChannelFactory` producing channels on a shared broker
#[derive(Debug, Clone)]
pub struct InMemoryChannelFactory {
    broker: Arc<InMemoryBroker>,
}

impl InMemoryChannelFactory {
    pub fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }
}

impl ChannelFactory for InMemoryChannelFactory {
    fn create_channel(
        &self,
        configuration: TransportConfiguration,
    ) -> MessagingResult<Arc<dyn TransportChannel>> {
        Ok(self.broker.channel(configuration))
    }
}
