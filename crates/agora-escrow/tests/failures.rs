//! Orders that fail: rejections, timeouts, retries and refunds

mod common;

use std::sync::Arc;
use std::time::Duration;

use agora_escrow::{fulfill_request, OrchestratorConfig, OrderError, Progress, Step};
use agora_ledger::{
    AgreementRecord, CreateAgreementRequest, EventKind, FulfillRequest, LedgerClient, LedgerEvent, SimulatedLedger,
    TxKind, TxReceipt,
};
use agora_types::{Address, AgreementStatus, Bytes32, ConditionRole, ConditionState, ContractAddresses, U256};
use async_trait::async_trait;
use common::*;

/// Ledger client that forges the condition ID of every reward fulfillment
struct TamperingLedger {
    inner: Arc<SimulatedLedger>,
}

#[async_trait]
impl LedgerClient for TamperingLedger {
    async fn create_agreement(&self, request: &CreateAgreementRequest) -> agora_ledger::Result<TxReceipt> {
        self.inner.create_agreement(request).await
    }

    async fn fulfill_lock(&self, request: &FulfillRequest, price: U256) -> agora_ledger::Result<TxReceipt> {
        self.inner.fulfill_lock(request, price).await
    }

    async fn fulfill_condition(&self, request: &FulfillRequest) -> agora_ledger::Result<TxReceipt> {
        self.inner.fulfill_condition(request).await
    }

    async fn fulfill_reward(&self, request: &FulfillRequest) -> agora_ledger::Result<TxReceipt> {
        let mut forged = request.clone();
        forged.condition_id = Bytes32::new([0xee; 32]);
        self.inner.fulfill_reward(&forged).await
    }

    async fn condition_state(&self, condition_id: &Bytes32) -> agora_ledger::Result<ConditionState> {
        self.inner.condition_state(condition_id).await
    }

    async fn agreement(&self, agreement_id: &Bytes32) -> agora_ledger::Result<Option<AgreementRecord>> {
        self.inner.agreement(agreement_id).await
    }
}

async fn tx_kinds(harness: &Harness) -> Vec<TxKind> {
    harness.ledger.transactions().await.iter().map(|t| t.kind).collect()
}

#[tokio::test]
async fn test_mismatched_reward_is_an_error_not_a_success() {
    let ledger = Arc::new(SimulatedLedger::new());
    let client: Arc<dyn LedgerClient> = Arc::new(TamperingLedger { inner: ledger.clone() });
    let harness = Harness::with_client(ledger, client);
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xd1);
    harness.fund(buyer).await;
    let provider = harness.start_provider();
    let orchestrator = harness.orchestrator(fast_config());

    let mut saga = orchestrator.begin_order(&did, 1, buyer).await.unwrap();
    let err = orchestrator.drive(&mut saga).await.unwrap_err();

    assert!(matches!(err, OrderError::Rejected { step: Step::Reward, .. }));
    assert_eq!(saga.status(), AgreementStatus::ServiceFulfilled);
    assert_eq!(harness.ledger.balance(&RECEIVER_A).await, U256::ZERO);
    assert_eq!(harness.ledger.escrowed(&saga.agreement_id()).await, U256::from(PRICE));
    provider.abort();
}

#[tokio::test]
async fn test_service_timeout_denies_access_without_reward() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xd2);
    harness.fund(buyer).await;
    let config = OrchestratorConfig {
        service_timeout_ms: 100,
        ..fast_config()
    };
    let orchestrator = harness.orchestrator(config);

    let mut saga = orchestrator.begin_order(&did, 1, buyer).await.unwrap();
    let result = orchestrator.drive(&mut saga).await.unwrap();

    assert!(!result.access_granted);
    assert!(!result.refund);
    assert_eq!(saga.status(), AgreementStatus::ServicePending);
    assert!(!tx_kinds(&harness).await.contains(&TxKind::FulfillReward));
    // Funds stay recoverable
    assert_eq!(harness.ledger.escrowed(&saga.agreement_id()).await, U256::from(PRICE));
}

#[tokio::test]
async fn test_refund_after_service_expires() {
    let harness = Harness::with_block_time(Duration::from_millis(1));
    let did = harness.publish_access(30).await;
    let buyer = consumer(0xd3);
    harness.fund(buyer).await;
    let config = OrchestratorConfig {
        service_timeout_ms: 50,
        ..fast_config()
    };
    let orchestrator = harness.orchestrator(config);

    let mut saga = orchestrator.begin_order(&did, 1, buyer).await.unwrap();
    let denied = orchestrator.drive(&mut saga).await.unwrap();
    assert!(!denied.access_granted);
    assert_eq!(harness.ledger.balance(&buyer).await, U256::ZERO);

    let refunded = orchestrator.refund(&mut saga).await.unwrap();
    assert!(refunded.refund);
    assert!(!refunded.access_granted);
    assert_eq!(saga.status(), AgreementStatus::Refunded);
    assert_eq!(harness.ledger.balance(&buyer).await, U256::from(PRICE));
    assert_eq!(harness.ledger.balance(&RECEIVER_A).await, U256::ZERO);
}

#[tokio::test]
async fn test_refund_times_out_while_service_is_open() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xd4);
    harness.fund(buyer).await;
    let config = OrchestratorConfig {
        service_timeout_ms: 20,
        refund_timeout_ms: 50,
        ..fast_config()
    };
    let orchestrator = harness.orchestrator(config);

    let mut saga = orchestrator.begin_order(&did, 1, buyer).await.unwrap();
    orchestrator.drive(&mut saga).await.unwrap();
    let err = orchestrator.refund(&mut saga).await.unwrap_err();

    assert!(matches!(err, OrderError::Timeout { step: Step::Refund }));
    assert_eq!(saga.status(), AgreementStatus::ServicePending);
}

#[tokio::test]
async fn test_lost_lock_event_with_funds_locked_refunds() {
    let harness = Harness::with_block_time(Duration::from_millis(1));
    let did = harness.publish_access(20).await;
    let buyer = consumer(0xd5);
    harness.fund(buyer).await;
    harness
        .ledger
        .silence_events_from(ContractAddresses::default().lock_payment_condition)
        .await;
    let config = OrchestratorConfig {
        lock_timeout_ms: 100,
        ..fast_config()
    };

    let result = harness
        .orchestrator(config)
        .execute_order(&did, 1, buyer)
        .await
        .unwrap();

    assert!(result.refund);
    assert!(!result.access_granted);
    assert_eq!(harness.ledger.balance(&buyer).await, U256::from(PRICE));
}

#[tokio::test]
async fn test_lagged_listener_falls_back_to_the_ledger() {
    let harness = Harness::with_ledger(Arc::new(SimulatedLedger::new().with_event_capacity(4)));
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xd9);
    harness.fund(buyer).await;
    let orchestrator = harness.orchestrator(fast_config());

    let mut saga = orchestrator.begin_order(&did, 1, buyer).await.unwrap();
    assert!(matches!(orchestrator.await_confirmation(&mut saga).await.unwrap(), Progress::Continue));
    assert!(matches!(orchestrator.fulfill_lock(&mut saga).await.unwrap(), Progress::Continue));

    // Deliver, then bury the service event under more than the stream can hold
    let service = saga.condition(ConditionRole::Service).unwrap().clone();
    let receipt = harness
        .ledger
        .fulfill_condition(&fulfill_request(saga.agreement_id(), &service))
        .await
        .unwrap();
    assert!(receipt.is_success());
    let events = harness.ledger.events();
    for seed in 0..8u8 {
        events.publish(LedgerEvent {
            kind: EventKind::AgreementCreated,
            agreement_id: Bytes32::new([seed; 32]),
            condition_id: None,
            contract_address: Address::ZERO,
            block_number: 0,
        });
    }

    let progress = orchestrator.await_service_fulfillment(&mut saga).await.unwrap();
    assert!(matches!(progress, Progress::Continue));
    assert_eq!(saga.status(), AgreementStatus::ServiceFulfilled);

    match orchestrator.fulfill_reward(&mut saga).await.unwrap() {
        Progress::Finished(result) => assert!(result.access_granted),
        Progress::Continue => panic!("reward should finish the order"),
    }
    assert_eq!(harness.ledger.balance(&RECEIVER_A).await, U256::from(9u64));
}

#[tokio::test]
async fn test_confirmation_timeout_aborts_before_locking() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xd6);
    harness.fund(buyer).await;
    harness
        .ledger
        .silence_events_from(ContractAddresses::default().access_template)
        .await;
    let config = OrchestratorConfig {
        confirmation_timeout_ms: 50,
        ..fast_config()
    };
    let orchestrator = harness.orchestrator(config);

    let mut saga = orchestrator.begin_order(&did, 1, buyer).await.unwrap();
    match orchestrator.await_confirmation(&mut saga).await.unwrap() {
        Progress::Finished(result) => assert!(!result.access_granted),
        Progress::Continue => panic!("confirmation should have timed out"),
    }
    assert_eq!(saga.status(), AgreementStatus::Aborted);
    assert_eq!(tx_kinds(&harness).await, vec![TxKind::CreateAgreement]);
    assert_eq!(harness.ledger.balance(&buyer).await, U256::from(PRICE));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let buyer = consumer(0xd7);
    harness.fund(buyer).await;
    let provider = harness.start_provider();
    harness.ledger.fail_next(2);

    let result = harness
        .orchestrator(fast_config())
        .execute_order(&did, 1, buyer)
        .await
        .unwrap();

    assert!(result.access_granted);
    let statuses: Vec<Option<u64>> = harness
        .ledger
        .transactions()
        .await
        .iter()
        .filter(|t| t.kind == TxKind::CreateAgreement)
        .map(|t| t.status)
        .collect();
    assert_eq!(statuses, vec![None, None, Some(1)]);
    provider.abort();
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_order() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    harness.ledger.fail_next(10);

    let err = harness
        .orchestrator(fast_config())
        .execute_order(&did, 1, consumer(0xd8))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrderError::Ledger {
            step: Step::CreateAgreement,
            attempts: 3,
            ..
        }
    ));
    assert_eq!(harness.ledger.transactions().await.len(), 3);
    assert_eq!(harness.listeners(), 0);
}

#[tokio::test]
async fn test_unfunded_lock_is_rejected_and_aborts() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let orchestrator = harness.orchestrator(fast_config());

    let mut saga = orchestrator.begin_order(&did, 1, consumer(0xd9)).await.unwrap();
    orchestrator.await_confirmation(&mut saga).await.unwrap();
    let err = orchestrator.fulfill_lock(&mut saga).await.unwrap_err();

    assert!(matches!(err, OrderError::Rejected { step: Step::Lock, .. }));
    assert_eq!(saga.status(), AgreementStatus::Aborted);
    assert_eq!(saga.open_subscriptions(), 0);
}

#[tokio::test]
async fn test_unknown_document_or_service() {
    let harness = Harness::new();
    let did = harness.publish_access(0).await;
    let orchestrator = harness.orchestrator(fast_config());

    let missing = agora_types::Did::new("nv", Bytes32::new([0x42; 32]));
    assert!(matches!(
        orchestrator.execute_order(&missing, 1, consumer(1)).await,
        Err(OrderError::Metadata(_))
    ));
    assert!(matches!(
        orchestrator.execute_order(&did, 0, consumer(1)).await,
        Err(OrderError::InvalidOrder(_))
    ));
    assert!(harness.ledger.transactions().await.is_empty());
}
