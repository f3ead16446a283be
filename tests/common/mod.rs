//! Shared mocks and fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pirina_transport::handlers::{Handles, HandlerRegistry};
use pirina_transport::logging::{EventId, EventLogger, Severity};
use pirina_transport::messaging::{
    ChannelFactory, InMemoryBroker, InMemoryChannelFactory, MessageListener, MessagingError, MessagingResult,
    TransportChannel, TransportConfiguration, TransportConnection, TransportDispatcher,
    TransportManager, TransportMessage, TransportMode,
};
use pirina_transport::providers::{DefaultComponentFactory, TransportComponentFactory};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const CONNECTION_STRING: &str = "inmemory://localhost";

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn queue_configuration(queue_name: &str, mode: TransportMode) -> TransportConfiguration {
    TransportConfiguration::new(TransportConnection::new(CONNECTION_STRING, queue_name), mode)
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Event logger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub severity: Severity,
    pub event_id: EventId,
    pub source: String,
    pub message: String,
}

/// Event logger that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingEventLogger {
    events: Mutex<Vec<LoggedEvent>>,
}

impl RecordingEventLogger {
    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().clone()
    }

    pub fn events_with_id(&self, event_id: EventId) -> Vec<LoggedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_id == event_id)
            .cloned()
            .collect()
    }
}

impl EventLogger for RecordingEventLogger {
    fn log(&self, severity: Severity, event_id: EventId, source: &str, message: &str) {
        self.events.lock().push(LoggedEvent {
            severity,
            event_id,
            source: source.to_string(),
            message: message.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Channel that records every payload handed to `send` and can be told to fail
#[derive(Debug)]
pub struct ScriptedChannel {
    configuration: TransportConfiguration,
    sent: Mutex<Vec<Vec<u8>>>,
    send_attempts: AtomicUsize,
    failing: AtomicBool,
    failing_start: AtomicBool,
    running: AtomicBool,
    initialise_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new(queue_name: &str, mode: TransportMode) -> Arc<Self> {
        Self::from_configuration(queue_configuration(queue_name, mode))
    }

    pub fn from_configuration(configuration: TransportConfiguration) -> Arc<Self> {
        Arc::new(Self {
            configuration,
            sent: Mutex::new(Vec::new()),
            send_attempts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            failing_start: AtomicBool::new(false),
            running: AtomicBool::new(false),
            initialise_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(queue_name: &str) -> Arc<Self> {
        let channel = Self::new(queue_name, TransportMode::SendOnly);
        channel.set_failing(true);
        channel
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn initialise_calls(&self) -> usize {
        self.initialise_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing_start(&self, failing: bool) {
        self.failing_start.store(failing, Ordering::SeqCst);
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportChannel for ScriptedChannel {
    fn configuration(&self) -> &TransportConfiguration {
        &self.configuration
    }

    async fn initialise(&self, _cancellation: &CancellationToken) -> MessagingResult<()> {
        self.initialise_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self, _cancellation: &CancellationToken) -> MessagingResult<()> {
        if self.failing_start.load(Ordering::SeqCst) {
            return Err(MessagingError::channel_operation(
                self.configuration.queue_name(),
                "start",
                "broker unavailable",
            ));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, _cancellation: &CancellationToken) -> MessagingResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, payload: Vec<u8>, cancellation: &CancellationToken) -> MessagingResult<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);

        if cancellation.is_cancelled() {
            return Err(MessagingError::cancelled("send"));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(MessagingError::channel_operation(
                self.configuration.queue_name(),
                "send",
                "broker unavailable",
            ));
        }

        self.sent.lock().push(payload);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Hands out scripted channels and keeps them for inspection
#[derive(Debug, Default)]
pub struct ScriptedChannelFactory {
    channels: Mutex<Vec<Arc<ScriptedChannel>>>,
    failing_start: AtomicBool,
}

impl ScriptedChannelFactory {
    pub fn set_failing_start(&self, failing: bool) {
        self.failing_start.store(failing, Ordering::SeqCst);
    }

    pub fn channels(&self) -> Vec<Arc<ScriptedChannel>> {
        self.channels.lock().clone()
    }
}

impl ChannelFactory for ScriptedChannelFactory {
    fn create_channel(
        &self,
        configuration: TransportConfiguration,
    ) -> MessagingResult<Arc<dyn TransportChannel>> {
        let channel = ScriptedChannel::from_configuration(configuration);
        channel.set_failing_start(self.failing_start.load(Ordering::SeqCst));
        self.channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }
}

// ---------------------------------------------------------------------------
// Component factory
// ---------------------------------------------------------------------------

/// Wraps the default factory and counts resolutions
#[derive(Debug)]
pub struct CountingFactory {
    inner: DefaultComponentFactory,
    pub managers: AtomicUsize,
    pub listeners: AtomicUsize,
    pub dispatchers: AtomicUsize,
}

impl CountingFactory {
    pub fn new(inner: DefaultComponentFactory) -> Arc<Self> {
        Arc::new(Self {
            inner,
            managers: AtomicUsize::new(0),
            listeners: AtomicUsize::new(0),
            dispatchers: AtomicUsize::new(0),
        })
    }

    pub fn in_memory(broker: &Arc<InMemoryBroker>, registry: Arc<HandlerRegistry>) -> Arc<Self> {
        Self::new(
            DefaultComponentFactory::builder()
                .channel_factory(Arc::new(InMemoryChannelFactory::new(Arc::clone(broker))))
                .handler_resolver(registry)
                .build()
                .expect("factory builds"),
        )
    }

    pub fn manager_count(&self) -> usize {
        self.managers.load(Ordering::SeqCst)
    }

    pub fn dispatcher_count(&self) -> usize {
        self.dispatchers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportComponentFactory for CountingFactory {
    async fn create_manager(
        &self,
        configuration: TransportConfiguration,
    ) -> MessagingResult<Arc<TransportManager>> {
        self.managers.fetch_add(1, Ordering::SeqCst);
        // Widen the window for concurrent first calls
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.inner.create_manager(configuration).await
    }

    fn create_listener(&self) -> MessagingResult<Arc<dyn MessageListener>> {
        self.listeners.fetch_add(1, Ordering::SeqCst);
        self.inner.create_listener()
    }

    fn create_dispatcher(
        &self,
        manager: Arc<TransportManager>,
    ) -> MessagingResult<Arc<dyn TransportDispatcher>> {
        self.dispatchers.fetch_add(1, Ordering::SeqCst);
        self.inner.create_dispatcher(manager)
    }
}

// ---------------------------------------------------------------------------
// Messages and handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: u64,
}

impl TransportMessage for OrderPlaced {
    fn message_type() -> &'static str {
        "orders.placed"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub invoice_id: String,
}

impl TransportMessage for InvoiceIssued {
    fn message_type() -> &'static str {
        "billing.invoice_issued"
    }
}

/// Handler recording every message it receives, optionally into a shared journal
#[derive(Debug, Default)]
pub struct RecordingHandler<M> {
    pub name: &'static str,
    received: Mutex<Vec<M>>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl<M> RecordingHandler<M> {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            received: Mutex::new(Vec::new()),
            journal: None,
        })
    }

    pub fn with_journal(name: &'static str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            received: Mutex::new(Vec::new()),
            journal: Some(journal),
        })
    }
}

impl<M: Clone> RecordingHandler<M> {
    pub fn received(&self) -> Vec<M> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl<M> Handles<M> for RecordingHandler<M>
where
    M: TransportMessage + Clone,
{
    async fn handle(&self, message: M, _cancellation: &CancellationToken) -> MessagingResult<()> {
        if let Some(journal) = &self.journal {
            journal.lock().push(self.name.to_string());
        }
        self.received.lock().push(message);
        Ok(())
    }

    fn handler_name(&self) -> &str {
        self.name
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Listener appending its name and the payload to a shared journal
#[derive(Debug)]
pub struct JournalListener {
    pub name: &'static str,
    journal: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl JournalListener {
    pub fn new(name: &'static str, journal: Arc<Mutex<Vec<(String, Vec<u8>)>>>) -> Arc<Self> {
        Arc::new(Self { name, journal })
    }
}

#[async_trait]
impl MessageListener for JournalListener {
    async fn receive_message(
        &self,
        payload: &[u8],
        _cancellation: &CancellationToken,
    ) -> MessagingResult<()> {
        self.journal
            .lock()
            .push((self.name.to_string(), payload.to_vec()));
        Ok(())
    }

    fn attach_to(self: Arc<Self>, manager: &TransportManager) -> bool {
        manager.register_listener(self);
        true
    }
}
