//! Ledger contract addresses
//!
//! Deployment-specific addresses of the condition and template contracts.
//! Templates refer to them as `{contracts.<name>}` placeholders.

use serde::{Deserialize, Serialize};

use crate::{Address, ServiceType};

/// Addresses of every contract an agreement can touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddresses {
    // Conditions
    #[serde(default = "default_lock_payment")]
    pub lock_payment_condition: Address,
    #[serde(default = "default_access")]
    pub access_condition: Address,
    #[serde(default = "default_compute_execution")]
    pub compute_execution_condition: Address,
    #[serde(default = "default_transfer_did")]
    pub transfer_did_condition: Address,
    #[serde(default = "default_nft_holder")]
    pub nft_holder_condition: Address,
    #[serde(default = "default_nft_access")]
    pub nft_access_condition: Address,
    #[serde(default = "default_transfer_nft")]
    pub transfer_nft_condition: Address,
    #[serde(default = "default_escrow_payment")]
    pub escrow_payment_condition: Address,

    // Templates
    #[serde(default = "default_access_template")]
    pub access_template: Address,
    #[serde(default = "default_compute_template")]
    pub compute_template: Address,
    #[serde(default = "default_did_sale_template")]
    pub did_sale_template: Address,
    #[serde(default = "default_nft_access_template")]
    pub nft_access_template: Address,
    #[serde(default = "default_nft_sale_template")]
    pub nft_sale_template: Address,

    /// Payment token used when a service does not name one (zero = native)
    #[serde(default)]
    pub token: Address,
}

impl ContractAddresses {
    /// Agreement template contract for a service type
    pub fn template_for(&self, service_type: ServiceType) -> Option<Address> {
        match service_type {
            ServiceType::Metadata => None,
            ServiceType::Access => Some(self.access_template),
            ServiceType::Compute => Some(self.compute_template),
            ServiceType::DidSale => Some(self.did_sale_template),
            ServiceType::NftAccess => Some(self.nft_access_template),
            ServiceType::NftSale => Some(self.nft_sale_template),
        }
    }

    /// `(placeholder name, address)` pairs for template binding
    pub fn placeholders(&self) -> Vec<(&'static str, Address)> {
        vec![
            ("contracts.lockPaymentCondition", self.lock_payment_condition),
            ("contracts.accessCondition", self.access_condition),
            ("contracts.computeExecutionCondition", self.compute_execution_condition),
            ("contracts.transferDIDCondition", self.transfer_did_condition),
            ("contracts.nftHolderCondition", self.nft_holder_condition),
            ("contracts.nftAccessCondition", self.nft_access_condition),
            ("contracts.transferNFTCondition", self.transfer_nft_condition),
            ("contracts.escrowPaymentCondition", self.escrow_payment_condition),
        ]
    }
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            lock_payment_condition: default_lock_payment(),
            access_condition: default_access(),
            compute_execution_condition: default_compute_execution(),
            transfer_did_condition: default_transfer_did(),
            nft_holder_condition: default_nft_holder(),
            nft_access_condition: default_nft_access(),
            transfer_nft_condition: default_transfer_nft(),
            escrow_payment_condition: default_escrow_payment(),
            access_template: default_access_template(),
            compute_template: default_compute_template(),
            did_sale_template: default_did_sale_template(),
            nft_access_template: default_nft_access_template(),
            nft_sale_template: default_nft_sale_template(),
            token: Address::ZERO,
        }
    }
}

// =============================================================================
// Default Functions (local development deployment)
// =============================================================================

const fn dev_address(tag: u8, index: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = tag;
    bytes[19] = index;
    Address::new(bytes)
}

fn default_lock_payment() -> Address {
    dev_address(0xc0, 1)
}

fn default_access() -> Address {
    dev_address(0xc0, 2)
}

fn default_compute_execution() -> Address {
    dev_address(0xc0, 3)
}

fn default_transfer_did() -> Address {
    dev_address(0xc0, 4)
}

fn default_nft_holder() -> Address {
    dev_address(0xc0, 5)
}

fn default_nft_access() -> Address {
    dev_address(0xc0, 6)
}

fn default_transfer_nft() -> Address {
    dev_address(0xc0, 7)
}

fn default_escrow_payment() -> Address {
    dev_address(0xc0, 8)
}

fn default_access_template() -> Address {
    dev_address(0x7e, 1)
}

fn default_compute_template() -> Address {
    dev_address(0x7e, 2)
}

fn default_did_sale_template() -> Address {
    dev_address(0x7e, 3)
}

fn default_nft_access_template() -> Address {
    dev_address(0x7e, 4)
}

fn default_nft_sale_template() -> Address {
    dev_address(0x7e, 5)
}
