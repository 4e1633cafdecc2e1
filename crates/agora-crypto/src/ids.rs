//! Agreement and condition identifiers
//!
//! Agreement IDs are random. Condition IDs are content-derived:
//!
//! ```text
//! valuesHash  = keccak256(abi.encode(param_0, .., param_n))
//! conditionId = keccak256(abi.encode(bytes32 agreementId, address contract, bytes32 valuesHash))
//! ```

use agora_types::{Address, Bytes32, Condition, Param, ParamType, ParamValue};
use uuid::Uuid;

use crate::abi::{encode, AbiValue};
use crate::hash::hash_all;
use crate::{DerivationError, DerivationResult};

/// Generate a fresh agreement ID: two random 128-bit values, 64 lowercase hex
pub fn derive_agreement_id() -> String {
    let first = Uuid::new_v4().to_string().replace('-', "");
    let second = Uuid::new_v4().to_string().replace('-', "");
    format!("{}{}", first, second)
}

/// Parse a 64-hex agreement ID into its ledger word
pub fn agreement_id_bytes(agreement_id: &str) -> DerivationResult<Bytes32> {
    Bytes32::parse(agreement_id).map_err(|_| DerivationError::InvalidAgreementId(agreement_id.to_string()))
}

/// Hash already-parsed values in order
pub fn hash_values(values: &[AbiValue]) -> Bytes32 {
    hash_all(&[&encode(values)])
}

/// Parse and hash literal parameters in order.
///
/// Every parameter is parsed before anything is hashed.
pub fn values_hash(params: &[Param]) -> DerivationResult<Bytes32> {
    let values = params
        .iter()
        .map(|p| AbiValue::from_param(&p.name, p.param_type, &p.value))
        .collect::<DerivationResult<Vec<_>>>()?;
    Ok(hash_values(&values))
}

/// Condition ID from its agreement, contract and values hash
pub fn condition_id(agreement_id: &Bytes32, contract_address: &Address, values_hash: &Bytes32) -> Bytes32 {
    hash_values(&[
        AbiValue::Bytes32(*agreement_id),
        AbiValue::Address(*contract_address),
        AbiValue::Bytes32(*values_hash),
    ])
}

/// A condition with its parameters parsed and its identifier derived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundCondition {
    pub condition: Condition,
    /// Parsed parameters, in the exact order that was hashed
    pub values: Vec<AbiValue>,
    pub values_hash: Bytes32,
    pub id: Bytes32,
}

impl BoundCondition {
    pub fn name(&self) -> &str {
        &self.condition.name
    }

    pub fn contract_address(&self) -> Address {
        self.condition.contract_address
    }
}

/// Derive every condition of an agreement, in template order.
///
/// A `ConditionRef` parameter resolves to the ID of an earlier condition in
/// the same list; referencing a later or unknown condition is an error.
pub fn derive_conditions(agreement_id: &Bytes32, conditions: &[Condition]) -> DerivationResult<Vec<BoundCondition>> {
    let mut bound: Vec<BoundCondition> = Vec::with_capacity(conditions.len());
    for condition in conditions {
        let mut values = Vec::with_capacity(condition.parameters.len());
        for param in &condition.parameters {
            let value = match &param.value {
                ParamValue::ConditionRef(target) => {
                    if param.param_type != ParamType::Bytes32 {
                        return Err(DerivationError::InvalidReferenceType {
                            param: param.name.clone(),
                            param_type: param.param_type,
                        });
                    }
                    let earlier = bound.iter().find(|b| b.name() == target.as_str()).ok_or_else(|| {
                        DerivationError::UnresolvedReference {
                            param: param.name.clone(),
                            target: target.clone(),
                        }
                    })?;
                    AbiValue::Bytes32(earlier.id)
                }
                literal => AbiValue::from_param(&param.name, param.param_type, literal)?,
            };
            values.push(value);
        }
        let values_hash = hash_values(&values);
        let id = condition_id(agreement_id, &condition.contract_address, &values_hash);
        bound.push(BoundCondition {
            condition: condition.clone(),
            values,
            values_hash,
            id,
        });
    }
    Ok(bound)
}
