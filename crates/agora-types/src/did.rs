//! Decentralized identifiers for published assets
//!
//! A DID is content-addressed: its hash is derived from the asset's
//! canonicalized service descriptions, so it never changes once computed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{Bytes32, TypesError};

/// Default DID method for assets registered through Agora
pub const DEFAULT_DID_METHOD: &str = "nv";

/// A content-addressed document identifier: `did:<method>:<64 lowercase hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    method: String,
    hash: Bytes32,
}

impl Did {
    /// Build a DID from its method and 32-byte hash
    pub fn new(method: impl Into<String>, hash: Bytes32) -> Self {
        Self {
            method: method.into(),
            hash,
        }
    }

    /// Parse `did:<method>:<hex>`; the hex may carry a `0x` prefix
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let mut parts = s.splitn(3, ':');
        let (scheme, method, id) = match (parts.next(), parts.next(), parts.next()) {
            (Some(scheme), Some(method), Some(id)) => (scheme, method, id),
            _ => {
                return Err(TypesError::InvalidDid {
                    value: s.to_string(),
                    reason: "expected did:<method>:<hash>".to_string(),
                })
            }
        };
        if scheme != "did" {
            return Err(TypesError::InvalidDid {
                value: s.to_string(),
                reason: format!("unsupported scheme {}", scheme),
            });
        }
        if method.is_empty() || !method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(TypesError::InvalidDid {
                value: s.to_string(),
                reason: format!("invalid method {}", method),
            });
        }
        let hash = Bytes32::parse(id).map_err(|e| TypesError::InvalidDid {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(method, hash))
    }

    /// The DID method
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The 32-byte hash, as bound into condition parameters
    pub fn hash(&self) -> Bytes32 {
        self.hash
    }

    /// The 64 lowercase hex characters of the hash
    pub fn hash_hex(&self) -> String {
        self.hash.to_plain_hex()
    }

    /// Placeholder used for the owning document before its DID is known
    pub fn placeholder(method: &str) -> String {
        format!("did:{}:0", method)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.hash.to_plain_hex())
    }
}

impl FromStr for Did {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
