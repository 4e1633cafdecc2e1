//! Order types for Agora
//!
//! Amounts are ledger-width unsigned integers. They are parsed from decimal
//! or `0x` hex text and serialized as decimal strings; floating point is
//! never involved.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Address, TypesError, U256};

/// Parse a uint256 from decimal or `0x`-prefixed hex text
pub fn parse_u256(text: &str) -> Result<U256, TypesError> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex_digits) if !hex_digits.is_empty() => U256::from_str_radix(hex_digits, 16),
        Some(_) => {
            return Err(TypesError::InvalidUint {
                value: text.to_string(),
            })
        }
        None if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) => {
            U256::from_str_radix(trimmed, 10)
        }
        None => {
            return Err(TypesError::InvalidUint {
                value: text.to_string(),
            })
        }
    };
    parsed.map_err(|_| TypesError::InvalidUint {
        value: text.to_string(),
    })
}

/// Serde helpers for amounts written as decimal strings or JSON numbers
pub mod u256_text {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Str(String),
        Num(u64),
    }

    impl Text {
        fn into_u256(self) -> Result<U256, TypesError> {
            match self {
                Text::Str(s) => parse_u256(&s),
                Text::Num(n) => Ok(U256::from(n)),
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        Text::deserialize(deserializer)?
            .into_u256()
            .map_err(serde::de::Error::custom)
    }

    pub mod vec {
        use super::*;

        pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
            let text: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            text.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<U256>, D::Error> {
            Vec::<Text>::deserialize(deserializer)?
                .into_iter()
                .map(|t| t.into_u256().map_err(serde::de::Error::custom))
                .collect()
        }
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
            Option::<Text>::deserialize(deserializer)?
                .map(|t| t.into_u256().map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Who gets paid what when the escrow releases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSchedule {
    pub receivers: Vec<Address>,
    #[serde(with = "u256_text::vec")]
    pub amounts: Vec<U256>,
    #[serde(default, with = "u256_text::option", skip_serializing_if = "Option::is_none")]
    pub nft_count: Option<U256>,
}

impl RewardSchedule {
    pub fn new(receivers: Vec<Address>, amounts: Vec<U256>) -> Self {
        Self {
            receivers,
            amounts,
            nft_count: None,
        }
    }

    pub fn with_nft_count(mut self, count: U256) -> Self {
        self.nft_count = Some(count);
        self
    }

    /// Total price, i.e. the sum of every amount
    pub fn total(&self) -> Result<U256, TypesError> {
        self.amounts
            .iter()
            .try_fold(U256::ZERO, |acc, a| acc.checked_add(*a))
            .ok_or(TypesError::AmountOverflow)
    }
}

/// Terminal value of one order attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    /// Agreement ID as 64 lowercase hex characters
    pub service_agreement_id: String,
    pub access_granted: bool,
    pub refund: bool,
    pub service_index: u32,
}

impl OrderResult {
    pub fn granted(service_agreement_id: String, service_index: u32) -> Self {
        Self {
            service_agreement_id,
            access_granted: true,
            refund: false,
            service_index,
        }
    }

    pub fn denied(service_agreement_id: String, service_index: u32) -> Self {
        Self {
            service_agreement_id,
            access_granted: false,
            refund: false,
            service_index,
        }
    }

    pub fn refunded(service_agreement_id: String, service_index: u32) -> Self {
        Self {
            service_agreement_id,
            access_granted: false,
            refund: true,
            service_index,
        }
    }
}
