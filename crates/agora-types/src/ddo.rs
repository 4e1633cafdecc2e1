//! Asset documents (DDOs) for Agora
//!
//! A DDO describes a published asset as an indexed list of services. The
//! metadata service (index 0 by convention) carries the descriptive fields
//! that feed the asset checksum; sale services carry the price and reward
//! schedule that feed the condition templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Address, Did, RewardSchedule, TypesError, U256};

/// Default JSON-LD context of a DDO
pub const DDO_CONTEXT: &str = "https://w3id.org/did/v1";

/// Type of a service inside a DDO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    #[serde(rename = "metadata")]
    Metadata,
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "compute")]
    Compute,
    #[serde(rename = "did-sale")]
    DidSale,
    #[serde(rename = "nft-access")]
    NftAccess,
    #[serde(rename = "nft-sale")]
    NftSale,
}

impl ServiceType {
    /// All service types that can be ordered through an agreement template
    pub const ORDERABLE: [ServiceType; 5] = [
        ServiceType::Access,
        ServiceType::Compute,
        ServiceType::DidSale,
        ServiceType::NftAccess,
        ServiceType::NftSale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Access => "access",
            Self::Compute => "compute",
            Self::DidSale => "did-sale",
            Self::NftAccess => "nft-access",
            Self::NftSale => "nft-sale",
        }
    }

    /// Whether the service is backed by an agreement template
    pub fn is_orderable(&self) -> bool {
        !matches!(self, Self::Metadata)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata" => Ok(Self::Metadata),
            "access" => Ok(Self::Access),
            "compute" => Ok(Self::Compute),
            "did-sale" | "did-sales" => Ok(Self::DidSale),
            "nft-access" => Ok(Self::NftAccess),
            "nft-sale" | "nft-sales" => Ok(Self::NftSale),
            other => Err(TypesError::UnknownServiceType(other.to_string())),
        }
    }
}

/// A file referenced by the metadata service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFile {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Descriptive fields of the metadata service (`attributes.main`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataMain {
    pub name: String,
    pub author: String,
    pub license: String,
    #[serde(default)]
    pub files: Vec<AssetFile>,
}

/// One service of a DDO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub index: u32,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Address>,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl Service {
    /// Parse the service type tag
    pub fn kind(&self) -> Result<ServiceType, TypesError> {
        self.service_type.parse()
    }

    /// `attributes.main`, if present
    pub fn main(&self) -> Option<&serde_json::Value> {
        self.attributes.get("main")
    }

    /// Descriptive fields of a metadata service
    pub fn metadata_main(&self) -> Result<MetadataMain, TypesError> {
        let main = self.main().ok_or_else(|| self.invalid("missing attributes.main"))?;
        serde_json::from_value(main.clone()).map_err(|e| self.invalid(&e.to_string()))
    }

    /// Reward schedule of a sale service (`attributes.main.rewards`).
    ///
    /// A service without payment (NFT-gated access) only needs
    /// `attributes.main.nftAmount` and gets an empty schedule.
    pub fn reward_schedule(&self) -> Result<RewardSchedule, TypesError> {
        let nft_count = self
            .main()
            .and_then(|m| m.get("nftAmount"))
            .map(json_to_u256)
            .transpose()?;
        let rewards = match self.main().and_then(|m| m.get("rewards")) {
            Some(rewards) => rewards,
            None => {
                return nft_count
                    .map(|n| RewardSchedule::new(Vec::new(), Vec::new()).with_nft_count(n))
                    .ok_or_else(|| self.invalid("missing attributes.main.rewards"))
            }
        };
        let mut schedule: RewardSchedule =
            serde_json::from_value(rewards.clone()).map_err(|e| self.invalid(&e.to_string()))?;
        if schedule.nft_count.is_none() {
            schedule.nft_count = nft_count;
        }
        Ok(schedule)
    }

    /// Payment token (`attributes.main.tokenAddress`), if the service names one
    pub fn token_address(&self) -> Result<Option<Address>, TypesError> {
        match self.main().and_then(|m| m.get("tokenAddress")).and_then(|v| v.as_str()) {
            Some(s) => Address::parse(s).map(Some),
            None => Ok(None),
        }
    }

    /// Ledger timeout for the service condition (`attributes.main.timeout`)
    pub fn timeout(&self) -> u64 {
        self.main()
            .and_then(|m| m.get("timeout"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    fn invalid(&self, reason: &str) -> TypesError {
        TypesError::InvalidService {
            index: self.index,
            reason: reason.to_string(),
        }
    }
}

fn json_to_u256(value: &serde_json::Value) -> Result<U256, TypesError> {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    crate::parse_u256(&text)
}

/// Integrity proof attached when a DDO is sealed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: DateTime<Utc>,
    /// Publisher of the asset
    pub creator: Address,
    /// Checksum of every service, keyed by service index
    pub checksum: BTreeMap<String, String>,
}

/// A DID document describing a published asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ddo {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Did>,
    pub created: DateTime<Utc>,
    #[serde(rename = "service")]
    pub services: Vec<Service>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl Ddo {
    /// Create an unsealed document
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            context: DDO_CONTEXT.to_string(),
            id: None,
            created: Utc::now(),
            services,
            proof: None,
        }
    }

    /// Find a service by index
    pub fn service(&self, index: u32) -> Option<&Service> {
        self.services.iter().find(|s| s.index == index)
    }

    /// The metadata service, if any
    pub fn metadata_service(&self) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| matches!(s.kind(), Ok(ServiceType::Metadata)))
    }

    /// Publisher recorded in the proof
    pub fn publisher(&self) -> Option<Address> {
        self.proof.as_ref().map(|p| p.creator)
    }

    /// Asset name from the metadata service
    pub fn name(&self) -> Option<String> {
        self.metadata_service()
            .and_then(|s| s.metadata_main().ok())
            .map(|m| m.name)
    }
}
