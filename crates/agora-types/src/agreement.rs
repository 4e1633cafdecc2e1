//! Agreement types for Agora
//!
//! An agreement is a single purchase flow tracked by one identifier across
//! the ledger and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Address, Bytes32, Did};

/// Orchestrator-side status of an agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgreementStatus {
    /// Identifiers derived, creation submitted
    Created,
    /// Creation confirmed on the ledger, lock not yet fulfilled
    LockInitiated,
    /// Payment locked
    LockConfirmed,
    /// Waiting for the provider to fulfill the service condition
    ServicePending,
    /// Service condition fulfilled
    ServiceFulfilled,
    /// Reward paid out to the receivers
    RewardReleased,
    /// Abandoned before any funds were locked
    Aborted,
    /// Locked funds returned to the consumer
    Refunded,
}

impl AgreementStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RewardReleased | Self::Aborted | Self::Refunded)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: AgreementStatus) -> bool {
        use AgreementStatus::*;
        matches!(
            (self, next),
            (Created, LockInitiated)
                | (Created, Aborted)
                | (LockInitiated, LockConfirmed)
                | (LockInitiated, Aborted)
                | (LockInitiated, Refunded)
                | (LockConfirmed, ServicePending)
                | (LockConfirmed, ServiceFulfilled)
                | (LockConfirmed, Refunded)
                | (ServicePending, ServiceFulfilled)
                | (ServicePending, Refunded)
                | (ServicePending, Aborted)
                | (ServiceFulfilled, RewardReleased)
        )
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A service agreement between a publisher and a consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    /// Random 32-byte agreement identifier
    pub id: Bytes32,
    /// Asset being ordered
    pub did: Did,
    /// Address of the agreement template contract
    pub template_id: Address,
    /// Condition identifiers, in template order
    pub condition_ids: Vec<Bytes32>,
    /// Asset owner
    pub publisher: Address,
    /// Buyer
    pub consumer: Address,
    /// Current status
    pub status: AgreementStatus,
}

impl Agreement {
    /// The agreement ID as 64 lowercase hex characters
    pub fn id_hex(&self) -> String {
        self.id.to_plain_hex()
    }
}
