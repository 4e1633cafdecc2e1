//! Order planning
//!
//! Turns a sealed document, a service index and a consumer into the ordered
//! condition list of the matching template. Consumer and provider run the
//! same planning so that both sides derive identical condition IDs.

use agora_crypto::{derive_conditions, BoundCondition, DerivationResult};
use agora_templates::{TemplateEngine, TemplateParams};
use agora_types::{Address, Bytes32, Condition, ContractAddresses, Ddo, Did, RewardSchedule, ServiceType, U256};

use crate::{OrderError, Result};

/// Everything needed to create an agreement for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlan {
    pub did: Did,
    pub service_index: u32,
    pub service_type: ServiceType,
    /// Agreement template contract
    pub template_id: Address,
    pub publisher: Address,
    pub consumer: Address,
    pub rewards: RewardSchedule,
    /// Sum of the reward amounts, locked by the consumer
    pub price: U256,
    /// Expanded conditions, in template order
    pub conditions: Vec<Condition>,
}

impl OrderPlan {
    pub fn build(
        ddo: &Ddo,
        service_index: u32,
        consumer: Address,
        templates: &TemplateEngine,
        contracts: &ContractAddresses,
    ) -> Result<Self> {
        let did = ddo
            .id
            .clone()
            .ok_or_else(|| OrderError::InvalidOrder("document has no DID".to_string()))?;
        let publisher = ddo
            .publisher()
            .ok_or_else(|| OrderError::InvalidOrder(format!("{} has no integrity proof", did)))?;
        let service = ddo
            .service(service_index)
            .ok_or_else(|| OrderError::InvalidOrder(format!("{} has no service {}", did, service_index)))?;
        let service_type = service.kind()?;
        let template_id = contracts.template_for(service_type).ok_or_else(|| {
            OrderError::InvalidOrder(format!("service {} ({}) cannot be ordered", service_index, service_type))
        })?;

        let rewards = service.reward_schedule()?;
        let price = rewards.total()?;
        let token = service.token_address()?.unwrap_or(contracts.token);

        let params = TemplateParams::new()
            .with("did", did.hash())
            .with("consumer", consumer)
            .with("publisher", publisher)
            .with("tokenAddress", token)
            .with("timeout", service.timeout())
            .with_contracts(contracts);
        let conditions = templates.expand_service(service_type, &params, &rewards)?;

        Ok(Self {
            did,
            service_index,
            service_type,
            template_id,
            publisher,
            consumer,
            rewards,
            price,
            conditions,
        })
    }

    /// Derive the condition IDs of this plan under one agreement
    pub fn bind(&self, agreement_id: &Bytes32) -> DerivationResult<Vec<BoundCondition>> {
        derive_conditions(agreement_id, &self.conditions)
    }

    /// Index of the first service of `service_type` in a document
    pub fn service_index_for(ddo: &Ddo, service_type: ServiceType) -> Option<u32> {
        ddo.services
            .iter()
            .find(|s| s.kind().ok() == Some(service_type))
            .map(|s| s.index)
    }
}
