//! Event listeners are released however an order ends

mod common;

use std::time::Duration;

use agora_escrow::OrchestratorConfig;
use agora_types::U256;
use common::*;

#[tokio::test]
async fn test_completed_order_leaves_no_listeners() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xe1);
    harness.fund(buyer).await;
    let provider = harness.start_provider();
    let baseline = harness.listeners();
    assert_eq!(baseline, 1);

    let result = harness
        .orchestrator(fast_config())
        .execute_order(&did, 1, buyer)
        .await
        .unwrap();
    assert!(result.access_granted);
    assert_eq!(harness.listeners(), baseline);
    provider.abort();
}

#[tokio::test]
async fn test_timed_out_order_leaves_no_listeners() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xe2);
    harness.fund(buyer).await;
    let config = OrchestratorConfig {
        service_timeout_ms: 30,
        ..fast_config()
    };
    let orchestrator = harness.orchestrator(config);

    let mut saga = orchestrator.begin_order(&did, 1, buyer).await.unwrap();
    let result = orchestrator.drive(&mut saga).await.unwrap();
    assert!(!result.access_granted);
    assert_eq!(saga.open_subscriptions(), 0);
    assert_eq!(harness.listeners(), 0);
}

#[tokio::test]
async fn test_dropping_a_saga_releases_its_listeners() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let orchestrator = harness.orchestrator(fast_config());

    let saga = orchestrator.begin_order(&did, 1, consumer(0xe3)).await.unwrap();
    assert_eq!(saga.open_subscriptions(), 1);
    assert_eq!(harness.listeners(), 1);

    drop(saga);
    assert_eq!(harness.listeners(), 0);
}

#[tokio::test]
async fn test_abandoned_order_releases_its_listeners() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xe4);
    harness.fund(buyer).await;
    let config = OrchestratorConfig {
        service_timeout_ms: 60_000,
        ..fast_config()
    };
    let orchestrator = harness.orchestrator(config);

    let in_flight = tokio::spawn(async move { orchestrator.execute_order(&did, 1, buyer).await });
    // Wait until the saga is parked on the service condition
    let mut parked = false;
    for _ in 0..200 {
        if harness.ledger.balance(&buyer).await == U256::ZERO && harness.listeners() == 1 {
            parked = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(parked);

    in_flight.abort();
    assert!(in_flight.await.unwrap_err().is_cancelled());
    assert_eq!(harness.listeners(), 0);
}
