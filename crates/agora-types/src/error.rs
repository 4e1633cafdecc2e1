//! Error types for Agora domain values
//!
//! Parsing never pads, truncates or guesses: a value of the wrong width or
//! alphabet is an explicit error.

use thiserror::Error;

/// Result type for domain value parsing
pub type Result<T> = std::result::Result<T, TypesError>;

/// Domain value errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Hex string of the wrong length for the target width
    #[error("Invalid {kind}: expected {expected} bytes, got {value}")]
    InvalidWidth {
        kind: &'static str,
        expected: usize,
        value: String,
    },

    /// String is not hexadecimal
    #[error("Invalid {kind}: {value} is not a hex string")]
    InvalidHex { kind: &'static str, value: String },

    /// Unsigned integer that does not parse or does not fit 256 bits
    #[error("Invalid uint256: {value}")]
    InvalidUint { value: String },

    /// Malformed DID
    #[error("Invalid DID {value}: {reason}")]
    InvalidDid { value: String, reason: String },

    /// Unknown service type tag
    #[error("Unknown service type: {0}")]
    UnknownServiceType(String),

    /// Unknown parameter type tag
    #[error("Unknown parameter type: {0}")]
    UnknownParamType(String),

    /// A service is missing data needed to order it
    #[error("Service {index} is invalid: {reason}")]
    InvalidService { index: u32, reason: String },

    /// Reward amount arithmetic overflowed 256 bits
    #[error("Reward amounts overflow uint256")]
    AmountOverflow,
}
