//! Agora Crypto - Deterministic identifiers for asset escrow
//!
//! This crate provides:
//! - Keccak-256 hashing
//! - ABI encoding of typed condition parameters
//! - Agreement and condition identifier derivation
//! - Service checksums and content-addressed DIDs
//!
//! # Compatibility Invariant
//!
//! **Every identifier must be byte-identical to the one the ledger derives
//! from the same inputs.** Nothing here pads, truncates or guesses.

pub mod hash;
pub mod abi;
pub mod ids;
pub mod did;

pub use hash::*;
pub use abi::*;
pub use ids::*;
pub use did::*;

use agora_types::{ParamType, TypesError};
use thiserror::Error;

/// Identifier derivation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    #[error("Parameter {param} ({param_type}): {source}")]
    InvalidValue {
        param: String,
        param_type: ParamType,
        #[source]
        source: TypesError,
    },

    #[error("Parameter {param}: expected {expected} value for type {param_type}")]
    ShapeMismatch {
        param: String,
        param_type: ParamType,
        expected: &'static str,
    },

    #[error("Parameter {param} references unknown or later condition {target}")]
    UnresolvedReference { param: String, target: String },

    #[error("Parameter {param}: condition references must be bytes32, got {param_type}")]
    InvalidReferenceType { param: String, param_type: ParamType },

    #[error("Invalid agreement ID {0}")]
    InvalidAgreementId(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Types(#[from] TypesError),
}

pub type DerivationResult<T> = Result<T, DerivationError>;
