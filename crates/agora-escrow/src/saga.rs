//! Per-order saga state
//!
//! An [`OrderSaga`] owns one agreement, its bound conditions and every event
//! subscription registered on its behalf. Dropping the saga drops those
//! subscriptions, which is how cancellation releases event listeners.

use agora_crypto::BoundCondition;
use agora_ledger::{CreateAgreementRequest, FulfillRequest, Subscription};
use agora_types::{Agreement, AgreementStatus, Bytes32, ConditionRole, OrderResult};
use tracing::info;

use crate::{OrderError, OrderPlan, Result};

/// Outcome of one orchestrator step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The saga advanced; call the next step
    Continue,
    /// The order ended with this result
    Finished(OrderResult),
}

/// In-flight order of one consumer for one service
#[derive(Debug)]
pub struct OrderSaga {
    agreement: Agreement,
    plan: OrderPlan,
    conditions: Vec<BoundCondition>,
    pub(crate) created: Option<Subscription>,
    pub(crate) service_fulfilled: Option<Subscription>,
}

impl OrderSaga {
    pub(crate) fn new(agreement_id: Bytes32, plan: OrderPlan, conditions: Vec<BoundCondition>) -> Self {
        Self::with_status(agreement_id, plan, conditions, AgreementStatus::Created)
    }

    pub(crate) fn with_status(
        agreement_id: Bytes32,
        plan: OrderPlan,
        conditions: Vec<BoundCondition>,
        status: AgreementStatus,
    ) -> Self {
        let agreement = Agreement {
            id: agreement_id,
            did: plan.did.clone(),
            template_id: plan.template_id,
            condition_ids: conditions.iter().map(|c| c.id).collect(),
            publisher: plan.publisher,
            consumer: plan.consumer,
            status,
        };
        Self {
            agreement,
            plan,
            conditions,
            created: None,
            service_fulfilled: None,
        }
    }

    pub fn agreement(&self) -> &Agreement {
        &self.agreement
    }

    pub fn agreement_id(&self) -> Bytes32 {
        self.agreement.id
    }

    /// Agreement ID as 64 lowercase hex characters
    pub fn agreement_id_hex(&self) -> String {
        self.agreement.id_hex()
    }

    pub fn status(&self) -> AgreementStatus {
        self.agreement.status
    }

    pub fn plan(&self) -> &OrderPlan {
        &self.plan
    }

    pub fn service_index(&self) -> u32 {
        self.plan.service_index
    }

    /// Bound conditions, in template order
    pub fn conditions(&self) -> &[BoundCondition] {
        &self.conditions
    }

    /// First condition playing `role`
    pub fn condition(&self, role: ConditionRole) -> Option<&BoundCondition> {
        self.conditions.iter().find(|c| c.condition.role == role)
    }

    /// Number of event subscriptions currently held
    pub fn open_subscriptions(&self) -> usize {
        [&self.created, &self.service_fulfilled]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }

    pub(crate) fn required(&self, role: ConditionRole) -> Result<&BoundCondition> {
        self.condition(role).ok_or_else(|| {
            OrderError::InvalidOrder(format!("{} template has no {} condition", self.plan.service_type, role))
        })
    }

    /// Move to `next`, rejecting transitions the state machine forbids
    pub(crate) fn transition(&mut self, next: AgreementStatus) -> Result<()> {
        let from = self.agreement.status;
        if !from.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from, to: next });
        }
        self.agreement.status = next;
        info!(
            agreement_id = %self.agreement.id,
            %from,
            to = %next,
            "Agreement transition"
        );
        if next.is_terminal() {
            self.release_subscriptions();
        }
        Ok(())
    }

    pub(crate) fn release_subscriptions(&mut self) {
        self.created = None;
        self.service_fulfilled = None;
    }

    pub(crate) fn create_request(&self) -> CreateAgreementRequest {
        CreateAgreementRequest {
            agreement_id: self.agreement.id,
            did: self.agreement.did.clone(),
            template_id: self.agreement.template_id,
            condition_ids: self.agreement.condition_ids.clone(),
            timeouts: self.conditions.iter().map(|c| c.condition.timeout).collect(),
            timelocks: self.conditions.iter().map(|c| c.condition.timelock).collect(),
            publisher: self.agreement.publisher,
            consumer: self.agreement.consumer,
        }
    }

    pub(crate) fn fulfill_request(&self, condition: &BoundCondition) -> FulfillRequest {
        fulfill_request(self.agreement.id, condition)
    }

    pub(crate) fn granted(&self) -> OrderResult {
        OrderResult::granted(self.agreement_id_hex(), self.plan.service_index)
    }

    pub(crate) fn denied(&self) -> OrderResult {
        OrderResult::denied(self.agreement_id_hex(), self.plan.service_index)
    }

    pub(crate) fn refunded(&self) -> OrderResult {
        OrderResult::refunded(self.agreement_id_hex(), self.plan.service_index)
    }
}

/// Fulfillment of `condition` with the exact values it was derived from
pub fn fulfill_request(agreement_id: Bytes32, condition: &BoundCondition) -> FulfillRequest {
    FulfillRequest {
        agreement_id,
        condition_id: condition.id,
        contract_address: condition.contract_address(),
        values: condition.values.clone(),
    }
}
