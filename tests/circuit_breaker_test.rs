//! Circuit breaker policy: thresholds, short-circuiting, half-open probes and notifications

mod common;

use parking_lot::Mutex;
use pirina_transport::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerEvent, CircuitState,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn recorded_events(breaker: &CircuitBreaker) -> Arc<Mutex<Vec<CircuitBreakerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    breaker.subscribe(Arc::new(move |event: &CircuitBreakerEvent| {
        sink.lock().push(event.clone());
    }));
    events
}

async fn fail(breaker: &CircuitBreaker, message: &str) -> CircuitBreakerError<String> {
    let message = message.to_string();
    breaker
        .call(|| async move { Err::<(), _>(message) })
        .await
        .unwrap_err()
}

async fn succeed(breaker: &CircuitBreaker) -> Result<u32, CircuitBreakerError<String>> {
    breaker.call(|| async { Ok::<_, String>(7) }).await
}

#[tokio::test]
async fn test_threshold_raises_one_opened_with_triggering_error() {
    common::init_test_logging();
    let breaker =
        CircuitBreaker::new("orders", CircuitBreakerConfig::new(3, Duration::from_secs(30))).unwrap();
    let events = recorded_events(&breaker);

    fail(&breaker, "error 1").await;
    fail(&breaker, "error 2").await;
    assert!(events.lock().is_empty());
    assert_eq!(breaker.state(), CircuitState::Closed);

    fail(&breaker, "error 3").await;
    assert_eq!(breaker.state(), CircuitState::Open);

    let events = events.lock().clone();
    assert_eq!(
        events,
        vec![CircuitBreakerEvent::Opened {
            component: "orders".to_string(),
            break_duration: Duration::from_secs(30),
            trigger: "error 3".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_open_circuit_runs_failure_handler_without_action() {
    let breaker =
        CircuitBreaker::new("orders", CircuitBreakerConfig::new(1, Duration::from_secs(30))).unwrap();
    fail(&breaker, "boom").await;

    let actions = AtomicUsize::new(0);
    let handled = AtomicUsize::new(0);
    let (actions_ref, handled_ref) = (&actions, &handled);

    let result: Result<(), &'static str> = breaker
        .execute(
            move |_token| async move {
                actions_ref.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            },
            move |error| async move {
                handled_ref.fetch_add(1, Ordering::SeqCst);
                assert!(error.is_circuit_open());
                Err("short-circuited")
            },
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result, Err("short-circuited"));
    assert_eq!(actions.load(Ordering::SeqCst), 0);
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.metrics().short_circuited_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_successful_probe_raises_one_reset() {
    let breaker =
        CircuitBreaker::new("orders", CircuitBreakerConfig::new(2, Duration::from_secs(10))).unwrap();
    let events = recorded_events(&breaker);

    fail(&breaker, "a").await;
    fail(&breaker, "b").await;
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(10)).await;

    assert_eq!(succeed(&breaker).await.unwrap(), 7);
    assert_eq!(breaker.state(), CircuitState::Closed);

    // Further successes raise nothing
    succeed(&breaker).await.unwrap();

    let events = events.lock().clone();
    assert_eq!(events.len(), 2);
    assert!(events[0].is_opened());
    assert_eq!(
        events[1],
        CircuitBreakerEvent::Reset {
            component: "orders".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_failure_one_second_break_scenario() {
    let breaker =
        CircuitBreaker::new("orders", CircuitBreakerConfig::new(1, Duration::from_secs(1))).unwrap();
    let mut stream = breaker.event_stream();

    // First failure opens immediately
    let error = fail(&breaker, "connection refused").await;
    assert!(matches!(error, CircuitBreakerError::OperationFailed(ref m) if m == "connection refused"));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(stream.try_recv().unwrap().is_opened());

    // Within the break: short-circuited
    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(succeed(&breaker).await.unwrap_err().is_circuit_open());

    // After the break: the probe runs and closes the circuit
    tokio::time::advance(Duration::from_millis(500)).await;
    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(matches!(
        stream.try_recv().unwrap(),
        CircuitBreakerEvent::Reset { .. }
    ));
    assert!(stream.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_raises_opened_again() {
    let breaker =
        CircuitBreaker::new("orders", CircuitBreakerConfig::new(1, Duration::from_secs(5))).unwrap();
    let events = recorded_events(&breaker);

    fail(&breaker, "first").await;
    tokio::time::advance(Duration::from_secs(5)).await;
    fail(&breaker, "probe failed").await;

    assert_eq!(breaker.state(), CircuitState::Open);
    let events = events.lock().clone();
    assert_eq!(events.len(), 2);
    match &events[1] {
        CircuitBreakerEvent::Opened { trigger, .. } => assert_eq!(trigger, "probe failed"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_force_operations_raise_no_notifications() {
    let breaker = CircuitBreaker::new("orders", CircuitBreakerConfig::default()).unwrap();
    let events = recorded_events(&breaker);

    breaker.force_open();
    assert_eq!(breaker.state(), CircuitState::Open);
    breaker.force_closed();
    assert_eq!(breaker.state(), CircuitState::Closed);

    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn test_unsubscribed_observer_stops_receiving() {
    let breaker =
        CircuitBreaker::new("orders", CircuitBreakerConfig::new(1, Duration::from_secs(30))).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = breaker.subscribe(Arc::new(move |_: &CircuitBreakerEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(breaker.unsubscribe(id));
    assert!(!breaker.unsubscribe(id));
    fail(&breaker, "boom").await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

proptest! {
    /// The circuit stays closed through threshold - 1 failures and opens on the threshold-th,
    /// raising exactly one Opened.
    #[test]
    fn opens_exactly_at_threshold(threshold in 1u32..20, extra_failures in 0u32..5) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let breaker = CircuitBreaker::new(
                "prop",
                CircuitBreakerConfig::new(threshold, Duration::from_secs(60)),
            ).unwrap();
            let events = recorded_events(&breaker);

            for n in 1..threshold {
                fail(&breaker, &format!("error {n}")).await;
                prop_assert_eq!(breaker.state(), CircuitState::Closed);
            }

            fail(&breaker, "final").await;
            prop_assert_eq!(breaker.state(), CircuitState::Open);

            for _ in 0..extra_failures {
                prop_assert!(fail(&breaker, "ignored").await.is_circuit_open());
            }

            let events = events.lock().clone();
            prop_assert_eq!(events.len(), 1);
            let opened_by_final = matches!(&events[0], CircuitBreakerEvent::Opened { trigger, .. } if trigger == "final");
            prop_assert!(opened_by_final);
            Ok(())
        })?;
    }

    /// A success anywhere before the threshold restarts the count
    #[test]
    fn success_restarts_failure_count(threshold in 2u32..10, failures_before in 0u32..10) {
        let failures_before = failures_before % threshold;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let breaker = CircuitBreaker::new(
                "prop",
                CircuitBreakerConfig::new(threshold, Duration::from_secs(60)),
            ).unwrap();

            for _ in 0..failures_before {
                fail(&breaker, "before").await;
            }
            succeed(&breaker).await.unwrap();

            for _ in 0..threshold - 1 {
                fail(&breaker, "after").await;
            }
            prop_assert_eq!(breaker.state(), CircuitState::Closed);
            prop_assert_eq!(breaker.metrics().consecutive_failures, u64::from(threshold - 1));
            Ok(())
        })?;
    }
}
