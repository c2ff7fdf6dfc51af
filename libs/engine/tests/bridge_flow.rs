//! Interceptor → bridge → sink → store → assertions, over loopback TCP.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use observer_bridge::{BRIDGE_PORT_ENV, BridgeClient};
use observer_engine::{
    AssertionError, ObserverConfig, ObserverSystem, OutgoingMessage, RecordKind,
    RecordingPublisher, TEST_CASE_HEADER,
};
use observer_interceptor::{
    BridgeInterceptor, CommitOffset, ConsumerInterceptor, InboundRecord, OutboundRecord,
    ProducerInterceptor,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderCreated {
    id: u32,
    amount: i64,
}

fn payload(id: u32) -> Vec<u8> {
    serde_json::to_vec(&OrderCreated { id, amount: 100 }).unwrap()
}

async fn start(config: ObserverConfig) -> (ObserverSystem, BridgeInterceptor) {
    let system = ObserverSystem::start(config, Arc::new(RecordingPublisher::new()))
        .await
        .unwrap();
    let interceptor = BridgeInterceptor::spawn_on(
        BridgeClient::new(system.bridge_addr().to_string()),
        &Handle::current(),
    );
    (system, interceptor)
}

#[tokio::test]
async fn bridge_env_names_the_bound_port() {
    let (system, _interceptor) = start(ObserverConfig::default()).await;
    let (name, value) = system.bridge_env();
    assert_eq!(name, BRIDGE_PORT_ENV);
    assert_eq!(value, system.bridge_port().to_string());
    assert_ne!(system.bridge_port(), 0);
    system.stop().await;
}

#[tokio::test]
async fn consumed_message_travels_to_the_assertion() {
    let (system, interceptor) = start(ObserverConfig::default()).await;

    let body = payload(1);
    interceptor.on_consume(&[InboundRecord::new("orders", 0, 0, &body).with_key(b"k1")]);

    let found = system
        .should_be_consumed::<OrderCreated, _>(WAIT, |m| m.metadata.key.as_deref() == Some("k1"))
        .await
        .unwrap();
    assert_eq!(found.value.id, 1);
    assert_eq!(found.metadata.topic, "orders");
    system.stop().await;
}

#[tokio::test]
async fn error_topic_consumption_is_a_failure_only() {
    let (system, interceptor) = start(ObserverConfig::default()).await;

    let body = payload(2);
    interceptor.on_consume(&[InboundRecord::new("orders.error", 0, 0, &body)
        .with_header("x-exception-type", b"InvalidOrder")
        .with_header("x-exception-message", b"amount must be positive")]);

    let failure = system
        .should_be_failed::<OrderCreated, _>(WAIT, |m| m.value.id == 2)
        .because(|reason| reason.kind == "InvalidOrder")
        .await
        .unwrap();
    assert_eq!(failure.reason.message, "amount must be positive");
    assert!(system.store().consumed_messages().is_empty());
    assert_eq!(system.store().failed_messages().len(), 1);
    system.stop().await;
}

#[tokio::test]
async fn consumed_expectation_fails_fast_when_message_was_dead_lettered() {
    let (system, interceptor) = start(ObserverConfig::default()).await;

    let body = payload(3);
    interceptor.on_consume(&[InboundRecord::new("orders.DLT", 0, 0, &body)]);
    system
        .should_be_failed::<OrderCreated, _>(WAIT, |m| m.value.id == 3)
        .await
        .unwrap();

    let err = system
        .should_be_consumed::<OrderCreated, _>(Duration::from_secs(30), |m| m.value.id == 3)
        .await
        .unwrap_err();
    assert!(matches!(err, AssertionError::FailedInsteadOfConsumed { .. }));
    system.stop().await;
}

#[tokio::test]
async fn retries_and_commits_are_routed() {
    let (system, interceptor) = start(ObserverConfig::default()).await;

    let body = payload(4);
    interceptor.on_consume(&[
        InboundRecord::new("orders.retry", 0, 0, &body),
        InboundRecord::new("orders.retry", 0, 1, &body),
        InboundRecord::new("orders", 1, 7, &body),
    ]);
    interceptor.on_commit(&[CommitOffset::new("orders", 1, 8)]);

    system
        .should_be_retried::<OrderCreated, _>(WAIT, 2, |m| m.value.id == 4)
        .await
        .unwrap();
    system
        .should_be_consumed::<OrderCreated, _>(WAIT, |m| m.value.id == 4)
        .committed()
        .await
        .unwrap();
    system.should_be_committed("orders", 1, 7, WAIT).await.unwrap();
    assert!(!system.store().is_committed("orders", 1, 8));
    system.stop().await;
}

#[tokio::test]
async fn application_publishes_are_observed() {
    let (system, interceptor) = start(ObserverConfig::default()).await;

    let body = payload(5);
    interceptor.on_send(&OutboundRecord::new("orders.created", &body).with_key(b"5"));

    let found = system
        .should_be_published::<OrderCreated, _>(WAIT, |m| m.value.id == 5)
        .await
        .unwrap();
    assert_eq!(found.metadata.key.as_deref(), Some("5"));
    system.stop().await;
}

#[tokio::test]
async fn harness_publishes_are_recorded_only_when_listening() {
    let (quiet, _) = start(ObserverConfig::default()).await;
    quiet
        .publish(OutgoingMessage::json("orders", &OrderCreated { id: 6, amount: 1 }).unwrap())
        .await
        .unwrap();
    assert_eq!(quiet.store().len(RecordKind::Published), 0);
    quiet.stop().await;

    let config = ObserverConfig {
        listen_published_messages: true,
        ..ObserverConfig::default()
    };
    let (listening, _) = start(config).await;
    let receipt = listening
        .publish(
            OutgoingMessage::json("orders", &OrderCreated { id: 6, amount: 1 })
                .unwrap()
                .with_test_case("harness_publishes"),
        )
        .await
        .unwrap();
    assert_eq!(receipt.offset, 0);

    let found = listening
        .should_be_published::<OrderCreated, _>(Duration::ZERO, |m| m.value.id == 6)
        .await
        .unwrap();
    assert_eq!(found.metadata.headers[TEST_CASE_HEADER], "harness_publishes");
    listening.stop().await;
}

#[tokio::test]
async fn timeout_diagnostic_lists_what_was_seen() {
    let (system, interceptor) = start(ObserverConfig::default()).await;

    let body = payload(8);
    interceptor.on_consume(&[InboundRecord::new("orders", 0, 0, &body)]);
    system
        .should_be_consumed::<OrderCreated, _>(WAIT, |m| m.value.id == 8)
        .await
        .unwrap();

    let err = system
        .should_be_consumed::<OrderCreated, _>(Duration::from_millis(200), |m| m.value.id == 9)
        .named("order 9")
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("order 9"));
    assert!(message.contains("consumed so far (1)"));
    assert!(message.contains("orders"));
    system.stop().await;
}

#[tokio::test]
async fn clear_resets_between_cases() {
    let (system, interceptor) = start(ObserverConfig::default()).await;

    let body = payload(10);
    interceptor.on_consume(&[InboundRecord::new("orders", 0, 0, &body)]);
    system
        .should_be_consumed::<OrderCreated, _>(WAIT, |m| m.value.id == 10)
        .await
        .unwrap();

    system.clear();
    assert_eq!(system.report().consumed, 0);
    system.stop().await;
}
