#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agora_crypto::seal;
use agora_escrow::{AgreementOrchestrator, OrchestratorConfig, OrchestratorDeps, SimulatedProvider};
use agora_ledger::{EventStream, LedgerClient, SimulatedLedger};
use agora_metadata::{InMemoryMetadataStore, MetadataStore};
use agora_templates::TemplateEngine;
use agora_types::{Address, ContractAddresses, Ddo, Did, Service, U256};
use serde_json::json;
use tokio::task::JoinHandle;

pub const PUBLISHER: Address = Address::new([0xaa; 20]);
pub const RECEIVER_A: Address = Address::new([0xa1; 20]);
pub const RECEIVER_B: Address = Address::new([0xa2; 20]);

pub fn consumer(seed: u8) -> Address {
    Address::new([seed; 20])
}

pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_attempts: 3,
        retry_delay_ms: 5,
        confirmation_timeout_ms: 1_000,
        lock_timeout_ms: 1_000,
        service_timeout_ms: 1_000,
        reward_timeout_ms: 500,
        refund_timeout_ms: 2_000,
        poll_interval_ms: 5,
        ..OrchestratorConfig::default()
    }
}

pub fn metadata_service() -> Service {
    Service {
        index: 0,
        service_type: "metadata".to_string(),
        service_endpoint: Some("http://localhost:5000/api/v1/metadata/assets/ddo/{did}".to_string()),
        template_id: None,
        attributes: json!({"main": {
            "name": "UK Weather information 2011",
            "author": "Met Office",
            "license": "CC-BY",
            "files": [{"index": 0, "checksum": "efb2c764274b745f5fc37f97c6b0e761"}]
        }}),
    }
}

/// Access service paying 9 to `RECEIVER_A` and 1 to `RECEIVER_B`
pub fn access_service(index: u32, timeout_blocks: u64) -> Service {
    Service {
        index,
        service_type: "access".to_string(),
        service_endpoint: Some("http://localhost:8030/api/v1/gateway/services/access".to_string()),
        template_id: None,
        attributes: json!({"main": {
            "name": "dataAssetAccessServiceAgreement",
            "timeout": timeout_blocks,
            "rewards": {
                "receivers": [RECEIVER_A.to_string(), RECEIVER_B.to_string()],
                "amounts": ["9", "1"]
            }
        }}),
    }
}

pub fn nft_access_service(index: u32) -> Service {
    Service {
        index,
        service_type: "nft-access".to_string(),
        service_endpoint: None,
        template_id: None,
        attributes: json!({"main": {"name": "nftAccessAgreement", "timeout": 0, "nftAmount": 1}}),
    }
}

pub const PRICE: u64 = 10;

pub struct Harness {
    pub ledger: Arc<SimulatedLedger>,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub deps: OrchestratorDeps,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_ledger(Arc::new(SimulatedLedger::new()))
    }

    pub fn with_block_time(block_time: Duration) -> Self {
        Self::with_ledger(Arc::new(SimulatedLedger::with_block_time(block_time)))
    }

    pub fn with_ledger(ledger: Arc<SimulatedLedger>) -> Self {
        let client: Arc<dyn LedgerClient> = ledger.clone();
        Self::with_client(ledger, client)
    }

    /// Route every ledger call through `client` while keeping direct access
    /// to the simulated ledger behind it
    pub fn with_client(ledger: Arc<SimulatedLedger>, client: Arc<dyn LedgerClient>) -> Self {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let deps = OrchestratorDeps {
            ledger: client,
            events: Arc::new(ledger.events()),
            metadata: metadata.clone(),
            templates: Arc::new(TemplateEngine::bundled()),
            contracts: ContractAddresses::default(),
        };
        Self { ledger, metadata, deps }
    }

    pub async fn publish(&self, services: Vec<Service>) -> Did {
        let mut ddo = Ddo::new(services);
        let did = seal(&mut ddo, "nv", PUBLISHER).unwrap();
        self.metadata.create_document(ddo).await.unwrap();
        did
    }

    pub async fn publish_access(&self, timeout_blocks: u64) -> Did {
        self.publish(vec![metadata_service(), access_service(1, timeout_blocks)]).await
    }

    pub async fn fund(&self, account: Address) {
        self.ledger.mint(account, U256::from(PRICE)).await;
    }

    pub fn orchestrator(&self, config: OrchestratorConfig) -> AgreementOrchestrator {
        AgreementOrchestrator::new(self.deps.clone(), config)
    }

    pub fn start_provider(&self) -> JoinHandle<()> {
        SimulatedProvider::new(self.deps.clone()).spawn()
    }

    pub fn listeners(&self) -> usize {
        self.deps.events.listener_count()
    }
}
