//! Listener and dispatcher over the in-memory broker

mod common;

use common::{InvoiceIssued, OrderPlaced, RecordingHandler};
use parking_lot::Mutex;
use pirina_transport::handlers::{HandlerRegistry, SequentialHandlerInvoker};
use pirina_transport::logging::TracingEventLogger;
use pirina_transport::messaging::{
    DispatcherExt, InMemoryBroker, JsonSerializer, MessageListener, MessagingError,
    QueueDispatcher, QueueListener, TransportManager, TransportMessage, TransportMode,
};
use pirina_transport::resilience::{CircuitBreaker, CircuitBreakerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Fixture {
    broker: Arc<InMemoryBroker>,
    manager: Arc<TransportManager>,
    dispatcher: QueueDispatcher,
}

fn fixture(registry: Arc<HandlerRegistry>) -> Fixture {
    let broker = Arc::new(InMemoryBroker::new(3));
    let manager = Arc::new(
        TransportManager::builder()
            .channel(broker.channel(common::queue_configuration(
                "orders",
                TransportMode::SendReceive,
            )))
            .circuit_breaker(Arc::new(
                CircuitBreaker::new("orders", CircuitBreakerConfig::default()).unwrap(),
            ))
            .event_logger(Arc::new(TracingEventLogger))
            .build()
            .unwrap(),
    );

    let listener = Arc::new(QueueListener::new(
        Arc::new(JsonSerializer),
        registry,
        Arc::new(SequentialHandlerInvoker),
        Arc::new(TracingEventLogger),
    ));
    assert!(listener.attach_to(&manager));

    let dispatcher = QueueDispatcher::new(Arc::clone(&manager), Arc::new(JsonSerializer));
    Fixture {
        broker,
        manager,
        dispatcher,
    }
}

#[tokio::test]
async fn test_listener_invokes_exactly_the_handlers_of_the_message_type() {
    common::init_test_logging();
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = Arc::new(HandlerRegistry::new());

    let audit = RecordingHandler::<OrderPlaced>::with_journal("audit", Arc::clone(&journal));
    let fulfilment = RecordingHandler::<OrderPlaced>::with_journal("fulfilment", Arc::clone(&journal));
    let billing = RecordingHandler::<InvoiceIssued>::new("billing");
    registry.register::<OrderPlaced, _>(Arc::clone(&audit));
    registry.register::<OrderPlaced, _>(Arc::clone(&fulfilment));
    registry.register::<InvoiceIssued, _>(Arc::clone(&billing));

    let fixture = fixture(registry);
    let token = CancellationToken::new();
    fixture.manager.start(&token).await.unwrap();

    fixture
        .dispatcher
        .send_message(&OrderPlaced { order_id: 11 }, &token)
        .await
        .unwrap();

    let broker = Arc::clone(&fixture.broker);
    assert!(
        common::wait_until(|| {
            let broker = Arc::clone(&broker);
            async move { broker.queue_stats("orders").map(|s| s.completed) == Some(1) }
        })
        .await
    );

    assert_eq!(audit.received(), vec![OrderPlaced { order_id: 11 }]);
    assert_eq!(fulfilment.received(), vec![OrderPlaced { order_id: 11 }]);
    assert!(billing.received().is_empty());
    assert_eq!(*journal.lock(), vec!["audit".to_string(), "fulfilment".to_string()]);

    fixture.manager.stop(&token).await.unwrap();
}

#[tokio::test]
async fn test_message_without_handlers_is_still_completed() {
    let fixture = fixture(Arc::new(HandlerRegistry::new()));
    let token = CancellationToken::new();
    fixture.manager.start(&token).await.unwrap();

    fixture
        .dispatcher
        .send_message(
            &InvoiceIssued {
                invoice_id: "INV-1".to_string(),
            },
            &token,
        )
        .await
        .unwrap();

    let broker = Arc::clone(&fixture.broker);
    assert!(
        common::wait_until(|| {
            let broker = Arc::clone(&broker);
            async move { broker.queue_stats("orders").map(|s| s.completed) == Some(1) }
        })
        .await
    );
    assert_eq!(fixture.broker.queue_stats("orders").unwrap().dead_lettered, 0);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Unserializable {
    // Tuple keys are not valid JSON object keys
    lookup: HashMap<(u8, u8), u8>,
}

impl TransportMessage for Unserializable {}

#[tokio::test]
async fn test_serialization_failure_propagates_unchanged() {
    let fixture = fixture(Arc::new(HandlerRegistry::new()));
    let token = CancellationToken::new();
    fixture.manager.start(&token).await.unwrap();

    let message = Unserializable {
        lookup: HashMap::from([((1, 2), 3)]),
    };
    let error = fixture
        .dispatcher
        .send_message(&message, &token)
        .await
        .unwrap_err();

    assert!(matches!(error, MessagingError::MessageSerialization { .. }));
    assert_eq!(fixture.broker.queue_stats("orders").unwrap().sent, 0);
}

#[tokio::test]
async fn test_listener_surfaces_deserialization_failures() {
    let listener = QueueListener::new(
        Arc::new(JsonSerializer),
        Arc::new(HandlerRegistry::new()),
        Arc::new(SequentialHandlerInvoker),
        Arc::new(TracingEventLogger),
    );
    let token = CancellationToken::new();

    let error = listener.receive_message(b"not json", &token).await.unwrap_err();
    assert!(matches!(error, MessagingError::MessageDeserialization { .. }));

    let error = listener.receive_message(b"", &token).await.unwrap_err();
    assert!(matches!(error, MessagingError::MalformedPayload { .. }));
}

#[tokio::test]
async fn test_send_failure_is_wrapped_for_the_caller() {
    let fixture = fixture(Arc::new(HandlerRegistry::new()));

    // Manager never started: the channel refuses the send
    let error = fixture
        .dispatcher
        .send_message(&OrderPlaced { order_id: 1 }, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(error.is_send_failure());
}
