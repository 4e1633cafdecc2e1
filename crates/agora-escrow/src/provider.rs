//! Simulated service provider
//!
//! Watches the shared event stream the way a publisher's gateway would: on
//! every new agreement it re-plans the order from the published document,
//! and once the consumer's lock is fulfilled it fulfills the service
//! condition with the same parameters the consumer derived.
//!
//! Tracked agreements are swept against the ledger periodically and after
//! any lag in the event stream: settled or aborted ones are dropped, locked
//! ones delivered, and agreements whose lock never arrives are forgotten
//! once the retention period passes.

use std::collections::HashMap;
use std::time::Duration;

use agora_crypto::BoundCondition;
use agora_ledger::{EventFilter, EventKind, EventStream, LedgerClient, LedgerError, LedgerEvent, Subscription};
use agora_metadata::MetadataStore;
use agora_types::{Bytes32, ConditionRole, ConditionState};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{fulfill_request, OrchestratorDeps, OrderError, OrderPlan, Result, Step};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Conditions the provider tracks for one agreement
#[derive(Debug, Clone)]
struct PendingDelivery {
    lock_id: Bytes32,
    service: BoundCondition,
    tracked_at: Instant,
}

/// What a sweep decided for one tracked agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Review {
    Waiting,
    Deliver,
    Drop(&'static str),
}

/// Provider that delivers every order placed against published documents
pub struct SimulatedProvider {
    deps: OrchestratorDeps,
    delay: Duration,
    retention: Duration,
}

impl SimulatedProvider {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            deps,
            delay: Duration::ZERO,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Forget agreements whose lock has not arrived after this long
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Wait this long after a lock before delivering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Start watching events in a background task.
    ///
    /// The subscription is registered before this returns, so agreements
    /// created afterwards are never missed.
    pub fn spawn(self) -> JoinHandle<()> {
        let subscription = self.deps.events.subscribe(EventFilter::any());
        tokio::spawn(self.run(subscription))
    }

    async fn run(self, mut subscription: Subscription) {
        let mut pending: HashMap<Bytes32, PendingDelivery> = HashMap::new();
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                next = subscription.next_event() => match next {
                    Ok(event) => self.handle(event, &mut pending).await,
                    Err(LedgerError::Lagged { skipped }) => {
                        warn!(skipped, tracked = pending.len(), "Provider lagged, reconciling with the ledger");
                        self.sweep(&mut pending).await;
                    }
                    Err(err) => {
                        warn!(error = %err, "Provider event stream ended");
                        return;
                    }
                },
                _ = sweep.tick() => self.sweep(&mut pending).await,
            }
        }
    }

    async fn handle(&self, event: LedgerEvent, pending: &mut HashMap<Bytes32, PendingDelivery>) {
        match event.kind {
            EventKind::AgreementCreated => match self.plan_delivery(&event).await {
                Ok(delivery) => {
                    let lock_id = delivery.lock_id;
                    pending.insert(event.agreement_id, delivery);
                    // The lock may already be in when the provider catches up
                    if let Ok(ConditionState::Fulfilled) = self.deps.ledger.condition_state(&lock_id).await {
                        if let Some(delivery) = pending.remove(&event.agreement_id) {
                            self.deliver(event.agreement_id, delivery);
                        }
                    }
                }
                Err(err) => {
                    warn!(agreement_id = %event.agreement_id, error = %err, "Provider ignoring agreement");
                }
            },
            EventKind::ConditionFulfilled => {
                let is_lock = pending
                    .get(&event.agreement_id)
                    .map_or(false, |d| event.condition_id == Some(d.lock_id));
                if is_lock {
                    if let Some(delivery) = pending.remove(&event.agreement_id) {
                        self.deliver(event.agreement_id, delivery);
                    }
                }
            }
            EventKind::ConditionAborted => {
                let aborted = pending.get(&event.agreement_id).map_or(false, |d| {
                    event.condition_id == Some(d.lock_id) || event.condition_id == Some(d.service.id)
                });
                if aborted {
                    debug!(agreement_id = %event.agreement_id, "Dropping aborted agreement");
                    pending.remove(&event.agreement_id);
                }
            }
        }
    }

    /// Reconcile every tracked agreement with the ledger
    async fn sweep(&self, pending: &mut HashMap<Bytes32, PendingDelivery>) {
        let tracked: Vec<Bytes32> = pending.keys().copied().collect();
        for agreement_id in tracked {
            let Some(delivery) = pending.get(&agreement_id) else {
                continue;
            };
            match self.review(delivery).await {
                Ok(Review::Waiting) => {}
                Ok(Review::Deliver) => {
                    if let Some(delivery) = pending.remove(&agreement_id) {
                        self.deliver(agreement_id, delivery);
                    }
                }
                Ok(Review::Drop(reason)) => {
                    debug!(agreement_id = %agreement_id, reason, "Provider dropping agreement");
                    pending.remove(&agreement_id);
                }
                Err(err) => warn!(agreement_id = %agreement_id, error = %err, "Provider sweep failed"),
            }
        }
    }

    async fn review(&self, delivery: &PendingDelivery) -> Result<Review> {
        let ledger = &self.deps.ledger;
        let service = ledger
            .condition_state(&delivery.service.id)
            .await
            .map_err(|e| OrderError::ledger(Step::Service, e))?;
        // Delivered elsewhere, expired or refunded
        if service.is_terminal() {
            return Ok(Review::Drop("service condition settled"));
        }
        let lock = ledger
            .condition_state(&delivery.lock_id)
            .await
            .map_err(|e| OrderError::ledger(Step::Lock, e))?;
        Ok(match lock {
            ConditionState::Fulfilled => Review::Deliver,
            ConditionState::Aborted => Review::Drop("lock aborted"),
            _ if delivery.tracked_at.elapsed() >= self.retention => Review::Drop("lock not fulfilled within retention"),
            _ => Review::Waiting,
        })
    }

    /// Re-derive the conditions of a newly created agreement
    async fn plan_delivery(&self, event: &LedgerEvent) -> Result<PendingDelivery> {
        let agreement_id = event.agreement_id;
        let record = self
            .deps
            .ledger
            .agreement(&agreement_id)
            .await
            .map_err(|e| OrderError::ledger(Step::Service, e))?
            .ok_or_else(|| OrderError::Mismatch {
                agreement_id,
                reason: "agreement is not registered".to_string(),
            })?;
        let ddo = self.deps.metadata.get_document(&record.did).await?;

        let service_type = ddo
            .services
            .iter()
            .filter_map(|s| s.kind().ok())
            .find(|t| self.deps.contracts.template_for(*t) == Some(record.template_id))
            .ok_or_else(|| OrderError::InvalidOrder(format!("{} has no service for template {}", record.did, record.template_id)))?;
        let service_index = OrderPlan::service_index_for(&ddo, service_type)
            .ok_or_else(|| OrderError::InvalidOrder(format!("{} has no {} service", record.did, service_type)))?;

        let plan = OrderPlan::build(
            &ddo,
            service_index,
            record.consumer,
            &self.deps.templates,
            &self.deps.contracts,
        )?;
        let conditions = plan.bind(&agreement_id)?;
        let derived: Vec<Bytes32> = conditions.iter().map(|c| c.id).collect();
        if derived != record.condition_ids {
            return Err(OrderError::Mismatch {
                agreement_id,
                reason: "registered condition IDs differ from the published document".to_string(),
            });
        }

        let find = |role: ConditionRole| conditions.iter().find(|c| c.condition.role == role).cloned();
        match (find(ConditionRole::Lock), find(ConditionRole::Service)) {
            (Some(lock), Some(service)) => {
                debug!(agreement_id = %agreement_id, %service_type, "Provider tracking agreement");
                Ok(PendingDelivery {
                    lock_id: lock.id,
                    service,
                    tracked_at: Instant::now(),
                })
            }
            _ => Err(OrderError::InvalidOrder(format!("{} template lacks lock or service", service_type))),
        }
    }

    fn deliver(&self, agreement_id: Bytes32, delivery: PendingDelivery) {
        let ledger = self.deps.ledger.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let request = fulfill_request(agreement_id, &delivery.service);
            match ledger.fulfill_condition(&request).await {
                Ok(receipt) if receipt.is_success() => {
                    info!(agreement_id = %agreement_id, condition = delivery.service.name(), "Service delivered")
                }
                Ok(receipt) => {
                    warn!(agreement_id = %agreement_id, tx_hash = %receipt.tx_hash, "Service fulfillment rejected")
                }
                Err(err) => warn!(agreement_id = %agreement_id, error = %err, "Service fulfillment failed"),
            }
        });
    }
}
