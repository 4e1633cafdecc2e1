//! Error types for agreement orchestration

use std::fmt;

use agora_crypto::DerivationError;
use agora_ledger::LedgerError;
use agora_metadata::MetadataError;
use agora_templates::TemplateError;
use agora_types::{AgreementStatus, Bytes32, TypesError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ledger-facing step of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    CreateAgreement,
    Lock,
    Service,
    Reward,
    Refund,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateAgreement => "agreement creation",
            Self::Lock => "payment lock",
            Self::Service => "service delivery",
            Self::Reward => "reward release",
            Self::Refund => "refund",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while driving an order
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Identifier derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Invalid document: {0}")]
    Types(#[from] TypesError),

    #[error("Cannot order: {0}")]
    InvalidOrder(String),

    /// Submission failed after exhausting retries, or failed permanently
    #[error("Ledger error during {step} after {attempts} attempt(s): {source}")]
    Ledger {
        step: Step,
        attempts: u32,
        #[source]
        source: LedgerError,
    },

    /// The ledger mined the transaction with a failure status
    #[error("Ledger rejected {step} (tx {tx_hash})")]
    Rejected { step: Step, tx_hash: Bytes32 },

    #[error("Timed out waiting for {step}")]
    Timeout { step: Step },

    #[error("Event stream failed during {step}: {source}")]
    Events {
        step: Step,
        #[source]
        source: LedgerError,
    },

    #[error("Illegal agreement transition {from} -> {to}")]
    InvalidTransition {
        from: AgreementStatus,
        to: AgreementStatus,
    },

    /// The agreement on the ledger does not match what the document derives
    #[error("Agreement {agreement_id} does not match its document: {reason}")]
    Mismatch { agreement_id: Bytes32, reason: String },
}

impl OrderError {
    /// Ledger error raised by a read or a single submission
    pub fn ledger(step: Step, source: LedgerError) -> Self {
        Self::Ledger {
            step,
            attempts: 1,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_step() {
        let err = OrderError::Ledger {
            step: Step::Lock,
            attempts: 3,
            source: LedgerError::transport("connection reset"),
        };
        assert_eq!(
            err.to_string(),
            "Ledger error during payment lock after 3 attempt(s): Ledger transport error: connection reset"
        );

        let err = OrderError::Timeout { step: Step::Refund };
        assert_eq!(err.to_string(), "Timed out waiting for refund");
    }
}
