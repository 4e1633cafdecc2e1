//! Agora Ledger - Boundary to the escrow ledger
//!
//! The ledger is an external collaborator. This crate defines how Agora talks
//! to it:
//!
//! - [`LedgerClient`]: transaction submission and state queries
//! - [`EventStream`]: filtered subscriptions on the shared event stream
//!
//! plus an in-process [`SimulatedLedger`] used by tests and the demo.
//!
//! # Invariants
//!
//! 1. A receipt with status other than `1` is a rejection, never a transport error
//! 2. Only [`LedgerError::Transport`] may be retried
//! 3. Subscriptions are registered when created, before any transaction they wait on

pub mod events;
pub mod sim;

pub use events::*;
pub use sim::*;

use agora_crypto::AbiValue;
use agora_types::{Address, Bytes32, ConditionState, Did, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur talking to the ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// RPC or network failure; the transaction may be resubmitted unchanged
    #[error("Ledger transport error: {message}")]
    Transport { message: String },

    /// The event stream closed while a subscription was waiting
    #[error("Ledger event stream closed")]
    StreamClosed,

    /// The listener fell behind and `skipped` events were dropped; the
    /// awaited event may have been among them
    #[error("Event subscription lagged, {skipped} events dropped")]
    Lagged { skipped: u64 },

    #[error("Agreement not found: {agreement_id}")]
    AgreementNotFound { agreement_id: Bytes32 },

    #[error("Condition not found: {condition_id}")]
    ConditionNotFound { condition_id: Bytes32 },
}

impl LedgerError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Whether resubmitting the same transaction may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Receipt of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: Bytes32,
    /// `1` on success
    pub status: u64,
    pub block_number: u64,
}

impl TxReceipt {
    pub const SUCCESS: u64 = 1;

    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }
}

/// Registration of an agreement and its ordered conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAgreementRequest {
    pub agreement_id: Bytes32,
    pub did: Did,
    pub template_id: Address,
    pub condition_ids: Vec<Bytes32>,
    /// Per-condition timeouts in blocks, aligned with `condition_ids`
    pub timeouts: Vec<u64>,
    /// Per-condition timelocks in blocks, aligned with `condition_ids`
    pub timelocks: Vec<u64>,
    pub publisher: Address,
    pub consumer: Address,
}

/// Fulfillment of one condition with its exact parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillRequest {
    pub agreement_id: Bytes32,
    pub condition_id: Bytes32,
    pub contract_address: Address,
    /// Parameters in the order they were hashed into `condition_id`
    pub values: Vec<AbiValue>,
}

/// Agreement as registered on the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementRecord {
    pub agreement_id: Bytes32,
    pub did: Did,
    pub template_id: Address,
    pub condition_ids: Vec<Bytes32>,
    pub publisher: Address,
    pub consumer: Address,
    pub created_block: u64,
}

/// Transaction submission and state queries
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Register an agreement
    async fn create_agreement(&self, request: &CreateAgreementRequest) -> Result<TxReceipt>;

    /// Fulfill the lock condition, paying `price` into escrow
    async fn fulfill_lock(&self, request: &FulfillRequest, price: U256) -> Result<TxReceipt>;

    /// Fulfill a delivery condition (submitted by the provider)
    async fn fulfill_condition(&self, request: &FulfillRequest) -> Result<TxReceipt>;

    /// Fulfill the escrow condition, releasing or refunding the locked funds
    async fn fulfill_reward(&self, request: &FulfillRequest) -> Result<TxReceipt>;

    /// Current state of a condition
    async fn condition_state(&self, condition_id: &Bytes32) -> Result<ConditionState>;

    /// Registered agreement, if any
    async fn agreement(&self, agreement_id: &Bytes32) -> Result<Option<AgreementRecord>>;
}
