//! Agreement orchestrator
//!
//! Drives one [`OrderSaga`] per order through the agreement lifecycle:
//!
//! ```text
//! begin_order ─▶ await_confirmation ─▶ fulfill_lock ─▶ await_service_fulfillment ─▶ fulfill_reward
//!      │                 │                  │                     │
//!      ▼                 ▼                  ▼                     ▼
//!   Aborted           Aborted      Aborted / refund()      ServicePending (denied)
//! ```
//!
//! Every event subscription is registered before the transaction that
//! triggers it is submitted. Sagas share nothing mutable; any number of
//! orders may run concurrently against the same orchestrator.

use std::sync::Arc;
use std::time::Duration;

use agora_crypto::{agreement_id_bytes, derive_agreement_id};
use agora_ledger::{EventFilter, EventStream, LedgerClient, LedgerError, Subscription};
use agora_metadata::MetadataStore;
use agora_templates::TemplateEngine;
use agora_types::{
    Address, AgreementStatus, Bytes32, ConditionRole, ConditionState, ContractAddresses, Did, OrderResult,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{submit_with_retry, OrchestratorConfig, OrderError, OrderPlan, OrderSaga, Progress, Result, Step};

/// Collaborators of the orchestrator
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub ledger: Arc<dyn LedgerClient>,
    pub events: Arc<dyn EventStream>,
    pub metadata: Arc<dyn MetadataStore>,
    pub templates: Arc<TemplateEngine>,
    pub contracts: ContractAddresses,
}

/// What an awaited event would have told us, asked of the ledger instead
#[derive(Debug, Clone, Copy)]
enum Awaited {
    Agreement(Bytes32),
    Condition(Bytes32),
}

/// Consumer-side driver of service agreements
#[derive(Clone)]
pub struct AgreementOrchestrator {
    deps: OrchestratorDeps,
    config: OrchestratorConfig,
}

impl AgreementOrchestrator {
    pub fn new(deps: OrchestratorDeps, config: OrchestratorConfig) -> Self {
        Self { deps, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn deps(&self) -> &OrchestratorDeps {
        &self.deps
    }

    /// Run an order from start to a terminal result
    pub async fn execute_order(&self, did: &Did, service_index: u32, consumer: Address) -> Result<OrderResult> {
        let mut saga = self.begin_order(did, service_index, consumer).await?;
        self.drive(&mut saga).await
    }

    /// Advance a saga from its current status until it yields a result
    pub async fn drive(&self, saga: &mut OrderSaga) -> Result<OrderResult> {
        loop {
            let progress = match saga.status() {
                AgreementStatus::Created => self.await_confirmation(saga).await?,
                AgreementStatus::LockInitiated => self.fulfill_lock(saga).await?,
                AgreementStatus::LockConfirmed | AgreementStatus::ServicePending => {
                    self.await_service_fulfillment(saga).await?
                }
                AgreementStatus::ServiceFulfilled => self.fulfill_reward(saga).await?,
                AgreementStatus::RewardReleased => Progress::Finished(saga.granted()),
                AgreementStatus::Aborted => Progress::Finished(saga.denied()),
                AgreementStatus::Refunded => Progress::Finished(saga.refunded()),
            };
            if let Progress::Finished(result) = progress {
                saga.release_subscriptions();
                return Ok(result);
            }
        }
    }

    /// Resolve the document, derive identifiers and submit the agreement.
    ///
    /// On success the saga is `Created` and already listening for the
    /// agreement-created event.
    pub async fn begin_order(&self, did: &Did, service_index: u32, consumer: Address) -> Result<OrderSaga> {
        let ddo = self.deps.metadata.get_document(did).await?;
        let plan = OrderPlan::build(&ddo, service_index, consumer, &self.deps.templates, &self.deps.contracts)?;

        let agreement_id = agreement_id_bytes(&derive_agreement_id())?;
        let conditions = plan.bind(&agreement_id)?;
        let mut saga = OrderSaga::new(agreement_id, plan, conditions);
        info!(
            agreement_id = %agreement_id,
            did = %did,
            service_index,
            service_type = %saga.plan().service_type,
            %consumer,
            "Order started"
        );

        saga.created = Some(self.deps.events.subscribe(EventFilter::agreement_created(agreement_id)));
        let request = saga.create_request();
        let ledger = &self.deps.ledger;
        let request = &request;
        let submitted =
            submit_with_retry(Step::CreateAgreement, &self.config, move || ledger.create_agreement(request)).await;

        match submitted {
            Ok(receipt) if receipt.is_success() => Ok(saga),
            Ok(receipt) => {
                saga.transition(AgreementStatus::Aborted)?;
                Err(OrderError::Rejected {
                    step: Step::CreateAgreement,
                    tx_hash: receipt.tx_hash,
                })
            }
            Err(err) => {
                saga.transition(AgreementStatus::Aborted)?;
                Err(err)
            }
        }
    }

    /// Wait for the agreement-created event.
    ///
    /// Without it within the confirmation timeout the saga aborts; nothing
    /// has been locked yet.
    pub async fn await_confirmation(&self, saga: &mut OrderSaga) -> Result<Progress> {
        self.expect_status(saga, &[AgreementStatus::Created], AgreementStatus::LockInitiated)?;
        let agreement_id = saga.agreement_id();
        let mut subscription = match saga.created.take() {
            Some(subscription) => subscription,
            None => {
                let subscription = self.deps.events.subscribe(EventFilter::agreement_created(agreement_id));
                if self.agreement_registered(&agreement_id).await? {
                    saga.transition(AgreementStatus::LockInitiated)?;
                    return Ok(Progress::Continue);
                }
                subscription
            }
        };

        let confirmed = self
            .await_event(
                Step::CreateAgreement,
                &mut subscription,
                Awaited::Agreement(agreement_id),
                self.config.confirmation_timeout(),
            )
            .await?;
        if confirmed {
            debug!(agreement_id = %agreement_id, "Agreement confirmed");
            saga.transition(AgreementStatus::LockInitiated)?;
            Ok(Progress::Continue)
        } else {
            warn!(agreement_id = %agreement_id, "Agreement creation not confirmed in time");
            saga.transition(AgreementStatus::Aborted)?;
            Ok(Progress::Finished(saga.denied()))
        }
    }

    /// Lock the payment and wait for the lock-fulfilled event.
    ///
    /// The service-fulfilled subscription is registered here too, so a
    /// provider reacting to the lock cannot outrun the consumer.
    pub async fn fulfill_lock(&self, saga: &mut OrderSaga) -> Result<Progress> {
        self.expect_status(saga, &[AgreementStatus::LockInitiated], AgreementStatus::LockConfirmed)?;
        let agreement_id = saga.agreement_id();
        let lock = saga.required(ConditionRole::Lock)?.clone();
        let service = saga.required(ConditionRole::Service)?.clone();

        let mut lock_events = self
            .deps
            .events
            .subscribe(EventFilter::condition_fulfilled(agreement_id, lock.id));
        saga.service_fulfilled = Some(
            self.deps
                .events
                .subscribe(EventFilter::condition_fulfilled(agreement_id, service.id)),
        );

        let request = saga.fulfill_request(&lock);
        let price = saga.plan().price;
        info!(agreement_id = %agreement_id, condition_id = %lock.id, %price, "Locking payment");
        let ledger = &self.deps.ledger;
        let request = &request;
        let submitted = submit_with_retry(Step::Lock, &self.config, move || ledger.fulfill_lock(request, price)).await;

        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(err) => {
                saga.transition(AgreementStatus::Aborted)?;
                return Err(err);
            }
        };
        if !receipt.is_success() {
            saga.transition(AgreementStatus::Aborted)?;
            return Err(OrderError::Rejected {
                step: Step::Lock,
                tx_hash: receipt.tx_hash,
            });
        }

        let locked = self
            .await_event(Step::Lock, &mut lock_events, Awaited::Condition(lock.id), self.config.lock_timeout())
            .await?;
        drop(lock_events);
        if locked {
            saga.transition(AgreementStatus::LockConfirmed)?;
            Ok(Progress::Continue)
        } else {
            self.resolve_unconfirmed_lock(saga).await
        }
    }

    /// The lock receipt succeeded but its event never came: ask the ledger
    /// whether funds were actually locked before deciding the outcome.
    async fn resolve_unconfirmed_lock(&self, saga: &mut OrderSaga) -> Result<Progress> {
        let lock_id = saga.required(ConditionRole::Lock)?.id;
        let state = self
            .deps
            .ledger
            .condition_state(&lock_id)
            .await
            .map_err(|e| OrderError::ledger(Step::Lock, e))?;
        warn!(agreement_id = %saga.agreement_id(), ?state, "Lock event not observed in time");

        if state != ConditionState::Fulfilled {
            saga.transition(AgreementStatus::Aborted)?;
            return Ok(Progress::Finished(saga.denied()));
        }
        let service_id = saga.required(ConditionRole::Service)?.id;
        if self.condition_state(Step::Lock, &service_id).await? == ConditionState::Fulfilled {
            // Delivered anyway; the service subscription already holds the event
            saga.transition(AgreementStatus::LockConfirmed)?;
            Ok(Progress::Continue)
        } else {
            self.refund(saga).await.map(Progress::Finished)
        }
    }

    /// Wait for the provider to fulfill the service condition.
    ///
    /// On timeout the saga stays `ServicePending` and a denied result is
    /// returned; the locked funds stay in escrow until [`Self::refund`].
    pub async fn await_service_fulfillment(&self, saga: &mut OrderSaga) -> Result<Progress> {
        self.expect_status(
            saga,
            &[AgreementStatus::LockConfirmed, AgreementStatus::ServicePending],
            AgreementStatus::ServiceFulfilled,
        )?;
        if saga.status() == AgreementStatus::LockConfirmed {
            saga.transition(AgreementStatus::ServicePending)?;
        }
        let agreement_id = saga.agreement_id();
        let service_id = saga.required(ConditionRole::Service)?.id;

        let mut subscription = match saga.service_fulfilled.take() {
            Some(subscription) => subscription,
            None => {
                let subscription = self
                    .deps
                    .events
                    .subscribe(EventFilter::condition_fulfilled(agreement_id, service_id));
                if self.condition_state(Step::Service, &service_id).await? == ConditionState::Fulfilled {
                    saga.transition(AgreementStatus::ServiceFulfilled)?;
                    return Ok(Progress::Continue);
                }
                subscription
            }
        };

        let awaited = Awaited::Condition(service_id);
        let delivered = self
            .await_event(Step::Service, &mut subscription, awaited, self.config.service_timeout())
            .await?;
        // The event stream is not the source of truth; ask once more before giving up
        if delivered || self.reached(Step::Service, awaited).await? {
            saga.transition(AgreementStatus::ServiceFulfilled)?;
            Ok(Progress::Continue)
        } else {
            warn!(agreement_id = %agreement_id, "Service not delivered in time");
            Ok(Progress::Finished(saga.denied()))
        }
    }

    /// Release the escrow to the receivers.
    ///
    /// Success is judged from the receipt. Templates without a reward
    /// condition complete as soon as the service is fulfilled.
    pub async fn fulfill_reward(&self, saga: &mut OrderSaga) -> Result<Progress> {
        self.expect_status(saga, &[AgreementStatus::ServiceFulfilled], AgreementStatus::RewardReleased)?;
        let agreement_id = saga.agreement_id();
        let reward = match saga.condition(ConditionRole::Reward) {
            Some(reward) => reward.clone(),
            None => {
                saga.transition(AgreementStatus::RewardReleased)?;
                return Ok(Progress::Finished(saga.granted()));
            }
        };

        let mut reward_events = self
            .deps
            .events
            .subscribe(EventFilter::condition_fulfilled(agreement_id, reward.id));
        let request = saga.fulfill_request(&reward);
        info!(agreement_id = %agreement_id, condition_id = %reward.id, "Releasing reward");
        let ledger = &self.deps.ledger;
        let request = &request;
        let receipt = submit_with_retry(Step::Reward, &self.config, move || ledger.fulfill_reward(request)).await?;
        if !receipt.is_success() {
            return Err(OrderError::Rejected {
                step: Step::Reward,
                tx_hash: receipt.tx_hash,
            });
        }

        saga.transition(AgreementStatus::RewardReleased)?;
        let observed = self
            .await_event(
                Step::Reward,
                &mut reward_events,
                Awaited::Condition(reward.id),
                self.config.reward_timeout(),
            )
            .await;
        match observed {
            Ok(true) => debug!(agreement_id = %agreement_id, "Reward event observed"),
            Ok(false) => warn!(agreement_id = %agreement_id, "Reward receipt succeeded but no event arrived"),
            Err(err) => warn!(agreement_id = %agreement_id, error = %err, "Reward event stream failed"),
        }
        Ok(Progress::Finished(saga.granted()))
    }

    /// Return locked funds to the consumer.
    ///
    /// The escrow only refunds once the service condition has aborted on the
    /// ledger, so this polls its state until it does or the refund timeout
    /// elapses.
    pub async fn refund(&self, saga: &mut OrderSaga) -> Result<OrderResult> {
        self.expect_status(
            saga,
            &[
                AgreementStatus::LockInitiated,
                AgreementStatus::LockConfirmed,
                AgreementStatus::ServicePending,
            ],
            AgreementStatus::Refunded,
        )?;
        let agreement_id = saga.agreement_id();
        let reward = saga
            .condition(ConditionRole::Reward)
            .cloned()
            .ok_or_else(|| OrderError::InvalidOrder(format!("{} agreements hold no funds", saga.plan().service_type)))?;
        let service_id = saga.required(ConditionRole::Service)?.id;

        let deadline = Instant::now() + self.config.refund_timeout();
        loop {
            match self.condition_state(Step::Refund, &service_id).await? {
                ConditionState::Aborted => break,
                ConditionState::Fulfilled => {
                    return Err(OrderError::InvalidOrder(format!(
                        "service of agreement {} was delivered; release the reward instead",
                        agreement_id
                    )))
                }
                _ if Instant::now() >= deadline => return Err(OrderError::Timeout { step: Step::Refund }),
                _ => tokio::time::sleep(self.config.poll_interval()).await,
            }
        }

        info!(agreement_id = %agreement_id, "Refunding locked payment");
        let request = saga.fulfill_request(&reward);
        let ledger = &self.deps.ledger;
        let request = &request;
        let receipt = submit_with_retry(Step::Refund, &self.config, move || ledger.fulfill_reward(request)).await?;
        if !receipt.is_success() {
            return Err(OrderError::Rejected {
                step: Step::Refund,
                tx_hash: receipt.tx_hash,
            });
        }
        saga.transition(AgreementStatus::Refunded)?;
        Ok(saga.refunded())
    }

    /// Rebuild the saga of an existing agreement from the ledger.
    ///
    /// Conditions are re-derived from the document and must match the IDs
    /// the ledger registered; the status is inferred from condition states.
    pub async fn resume_order(
        &self,
        agreement_id: &str,
        did: &Did,
        service_index: u32,
        consumer: Address,
    ) -> Result<OrderSaga> {
        let agreement_id = agreement_id_bytes(agreement_id)?;
        let ddo = self.deps.metadata.get_document(did).await?;
        let plan = OrderPlan::build(&ddo, service_index, consumer, &self.deps.templates, &self.deps.contracts)?;
        let conditions = plan.bind(&agreement_id)?;

        let record = self
            .deps
            .ledger
            .agreement(&agreement_id)
            .await
            .map_err(|e| OrderError::ledger(Step::CreateAgreement, e))?;
        let record = match record {
            Some(record) => record,
            None => {
                return Err(OrderError::Mismatch {
                    agreement_id,
                    reason: "agreement is not registered".to_string(),
                })
            }
        };
        let derived: Vec<Bytes32> = conditions.iter().map(|c| c.id).collect();
        if record.condition_ids != derived {
            return Err(OrderError::Mismatch {
                agreement_id,
                reason: "registered condition IDs differ from the derived ones".to_string(),
            });
        }

        let mut states = Vec::with_capacity(conditions.len());
        for condition in &conditions {
            states.push((condition.condition.role, self.condition_state(Step::CreateAgreement, &condition.id).await?));
        }
        let status = infer_status(&states);
        info!(agreement_id = %agreement_id, %status, "Order resumed");
        Ok(OrderSaga::with_status(agreement_id, plan, conditions, status))
    }

    /// Ledger state of every condition of a saga, in template order
    pub async fn agreement_status(&self, saga: &OrderSaga) -> Result<Vec<(String, ConditionState)>> {
        let mut states = Vec::with_capacity(saga.conditions().len());
        for condition in saga.conditions() {
            let state = self.condition_state(Step::CreateAgreement, &condition.id).await?;
            states.push((condition.name().to_string(), state));
        }
        Ok(states)
    }

    fn expect_status(&self, saga: &OrderSaga, allowed: &[AgreementStatus], to: AgreementStatus) -> Result<()> {
        if allowed.contains(&saga.status()) {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition {
                from: saga.status(),
                to,
            })
        }
    }

    /// Wait up to `timeout` for the event behind `awaited`.
    ///
    /// A lagged subscription may have dropped that event, so each lag is
    /// answered by asking the ledger directly. `false` means the timeout
    /// elapsed without the event.
    async fn await_event(
        &self,
        step: Step,
        subscription: &mut Subscription,
        awaited: Awaited,
        timeout: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match subscription.next_within(remaining).await {
                Ok(Some(_)) => return Ok(true),
                Ok(None) => return Ok(false),
                Err(LedgerError::Lagged { skipped }) => {
                    warn!(%step, skipped, ?awaited, "Events dropped, checking the ledger");
                    if self.reached(step, awaited).await? {
                        return Ok(true);
                    }
                }
                Err(source) => return Err(OrderError::Events { step, source }),
            }
        }
    }

    /// Whether the ledger already shows what `awaited` stands for
    async fn reached(&self, step: Step, awaited: Awaited) -> Result<bool> {
        match awaited {
            Awaited::Agreement(agreement_id) => self.agreement_registered(&agreement_id).await,
            Awaited::Condition(condition_id) => {
                Ok(self.condition_state(step, &condition_id).await? == ConditionState::Fulfilled)
            }
        }
    }

    async fn condition_state(&self, step: Step, condition_id: &Bytes32) -> Result<ConditionState> {
        self.deps
            .ledger
            .condition_state(condition_id)
            .await
            .map_err(|e| OrderError::ledger(step, e))
    }

    async fn agreement_registered(&self, agreement_id: &Bytes32) -> Result<bool> {
        self.deps
            .ledger
            .agreement(agreement_id)
            .await
            .map(|record| record.is_some())
            .map_err(|e| OrderError::ledger(Step::CreateAgreement, e))
    }
}

/// Saga status implied by the ledger state of each condition
fn infer_status(states: &[(ConditionRole, ConditionState)]) -> AgreementStatus {
    let state_of = |role: ConditionRole| states.iter().find(|(r, _)| *r == role).map(|(_, s)| *s);
    let lock = state_of(ConditionRole::Lock).unwrap_or_default();
    let service = state_of(ConditionRole::Service).unwrap_or_default();
    let reward = state_of(ConditionRole::Reward);

    match (lock, service, reward) {
        (ConditionState::Aborted, _, _) => AgreementStatus::Aborted,
        (ConditionState::Fulfilled, ConditionState::Aborted, Some(ConditionState::Fulfilled)) => {
            AgreementStatus::Refunded
        }
        (_, ConditionState::Fulfilled, None) | (_, ConditionState::Fulfilled, Some(ConditionState::Fulfilled)) => {
            AgreementStatus::RewardReleased
        }
        (_, ConditionState::Fulfilled, _) => AgreementStatus::ServiceFulfilled,
        (ConditionState::Fulfilled, ConditionState::Aborted, _) => AgreementStatus::ServicePending,
        (ConditionState::Fulfilled, _, _) => AgreementStatus::LockConfirmed,
        (_, ConditionState::Aborted, _) => AgreementStatus::Aborted,
        _ => AgreementStatus::LockInitiated,
    }
}
