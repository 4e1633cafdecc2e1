//! Condition types for Agora
//!
//! A condition is one step of the escrow saga. Each condition lives in a
//! ledger contract and is identified by a hash over the agreement it belongs
//! to, the contract address, and its ordered, typed parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Address, TypesError};

/// Ledger-side state of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConditionState {
    /// Not registered in any agreement
    #[default]
    Uninitialized,
    /// Registered, waiting to be fulfilled
    Unfulfilled,
    /// Fulfilled on the ledger
    Fulfilled,
    /// Timed out or explicitly aborted
    Aborted,
}

impl ConditionState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Aborted)
    }
}

/// Role a condition plays in the saga
///
/// Templates declare conditions in execution order: one lock-style condition
/// first, one delivery/service condition next, and an optional reward
/// condition last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionRole {
    /// Payment lock or holder proof, fulfilled by the consumer
    Lock,
    /// Access grant, compute start or transfer, fulfilled by the provider
    Service,
    /// Escrow release or refund
    Reward,
}

impl fmt::Display for ConditionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lock => "lock",
            Self::Service => "service",
            Self::Reward => "reward",
        };
        write!(f, "{}", s)
    }
}

/// ABI type tag of a condition parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    #[serde(rename = "bytes32")]
    Bytes32,
    #[serde(rename = "address")]
    Address,
    #[serde(rename = "uint256")]
    Uint256,
    #[serde(rename = "bytes32[]")]
    Bytes32Array,
    #[serde(rename = "address[]")]
    AddressArray,
    #[serde(rename = "uint256[]")]
    Uint256Array,
}

impl ParamType {
    /// Whether the type is a dynamic array
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Bytes32Array | Self::AddressArray | Self::Uint256Array)
    }

    /// Canonical ABI spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bytes32 => "bytes32",
            Self::Address => "address",
            Self::Uint256 => "uint256",
            Self::Bytes32Array => "bytes32[]",
            Self::AddressArray => "address[]",
            Self::Uint256Array => "uint256[]",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bytes32" => Ok(Self::Bytes32),
            "address" => Ok(Self::Address),
            "uint256" | "uint" => Ok(Self::Uint256),
            "bytes32[]" => Ok(Self::Bytes32Array),
            "address[]" => Ok(Self::AddressArray),
            "uint256[]" | "uint[]" => Ok(Self::Uint256Array),
            other => Err(TypesError::UnknownParamType(other.to_string())),
        }
    }
}

/// Unencoded value of a condition parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamValue {
    /// A single value in its textual form (hex or decimal)
    Scalar(String),
    /// A dynamic array of textual values
    Array(Vec<String>),
    /// The identifier of an earlier condition of the same agreement
    ConditionRef(String),
}

/// A named, typed condition parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub value: ParamValue,
}

impl Param {
    pub fn new(name: impl Into<String>, param_type: ParamType, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            param_type,
            value,
        }
    }
}

/// A condition descriptor expanded from a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Name of the condition inside its template (e.g. `lockPayment`)
    pub name: String,
    /// Name of the ledger contract implementing it
    pub contract_name: String,
    /// Address of the ledger contract implementing it
    pub contract_address: Address,
    /// Saga role
    pub role: ConditionRole,
    /// Last known state
    pub state: ConditionState,
    /// Ordered parameters, hashed exactly in this order
    pub parameters: Vec<Param>,
    /// Ledger timeout (in blocks, 0 = none)
    pub timeout: u64,
    /// Ledger timelock (in blocks, 0 = none)
    pub timelock: u64,
}

impl Condition {
    /// Find a parameter by name
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_type_serde_spelling() {
        let json = serde_json::to_string(&ParamType::AddressArray).unwrap();
        assert_eq!(json, "\"address[]\"");
        let back: ParamType = serde_json::from_str("\"uint256[]\"").unwrap();
        assert_eq!(back, ParamType::Uint256Array);
        assert!(back.is_array());
    }

    #[test]
    fn test_param_type_from_str_aliases() {
        assert_eq!("uint".parse::<ParamType>().unwrap(), ParamType::Uint256);
        assert!("bytes".parse::<ParamType>().is_err());
    }
}
