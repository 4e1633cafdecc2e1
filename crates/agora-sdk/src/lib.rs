//! Agora SDK - Publish data and compute assets, order them through escrow
//!
//! The SDK wraps the orchestrator and its collaborators behind one handle.
//!
//! # Quick Start
//!
//! ```ignore
//! use agora_sdk::{Agora, Address, RewardSchedule, ServiceType, U256};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // In-process ledger, metadata store and provider
//!     let agora = Agora::simulated(Default::default()).with_provider();
//!
//!     let publisher = Address::new([0xaa; 20]);
//!     let ddo = agora
//!         .asset("UK Weather information 2011", publisher)
//!         .author("Met Office")
//!         .service(ServiceType::Access, RewardSchedule::new(vec![publisher], vec![U256::from(10u64)]), 0)
//!         .publish()
//!         .await?;
//!
//!     let consumer = Address::new([0xcc; 20]);
//!     agora.fund(consumer, U256::from(10u64)).await?;
//!     let result = agora.order(ddo.id.as_ref().unwrap(), 1).consumer(consumer).execute().await?;
//!     assert!(result.access_granted);
//!     Ok(())
//! }
//! ```

pub use agora_types::*;

pub use agora_escrow::{
    AgreementOrchestrator, OrchestratorConfig, OrchestratorDeps, OrderError, OrderSaga, Progress,
};
pub use agora_metadata::{SearchPage, SearchQuery};

use std::sync::Arc;
use std::time::Duration;

use agora_crypto::{seal, DerivationError};
use agora_escrow::SimulatedProvider;
use agora_ledger::SimulatedLedger;
use agora_metadata::{InMemoryMetadataStore, MetadataError, MetadataStore};
use agora_templates::TemplateEngine;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::info;

// ============================================================================
// Error Types
// ============================================================================

/// SDK-specific errors
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("Order failed: {0}")]
    Order(#[from] OrderError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Could not seal document: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// SDK Result type
pub type SdkResult<T> = std::result::Result<T, SdkError>;

// ============================================================================
// Client
// ============================================================================

/// Handle on an Agora deployment
pub struct Agora {
    orchestrator: AgreementOrchestrator,
    simulation: Option<Arc<SimulatedLedger>>,
    provider: Option<JoinHandle<()>>,
}

impl Agora {
    /// Connect to explicit collaborators
    pub fn new(deps: OrchestratorDeps, config: OrchestratorConfig) -> Self {
        Self {
            orchestrator: AgreementOrchestrator::new(deps, config),
            simulation: None,
            provider: None,
        }
    }

    /// Fully in-process deployment with default contract addresses
    pub fn simulated(config: OrchestratorConfig) -> Self {
        Self::simulated_with(config, ContractAddresses::default(), Arc::new(SimulatedLedger::new()))
    }

    /// In-process deployment over a given simulated ledger
    pub fn simulated_with(config: OrchestratorConfig, contracts: ContractAddresses, ledger: Arc<SimulatedLedger>) -> Self {
        let deps = OrchestratorDeps {
            ledger: ledger.clone(),
            events: Arc::new(ledger.events()),
            metadata: Arc::new(InMemoryMetadataStore::new()),
            templates: Arc::new(TemplateEngine::bundled()),
            contracts,
        };
        Self {
            orchestrator: AgreementOrchestrator::new(deps, config),
            simulation: Some(ledger),
            provider: None,
        }
    }

    /// Run a simulated provider that delivers every order
    pub fn with_provider(self) -> Self {
        self.with_provider_delay(Duration::ZERO)
    }

    /// Run a simulated provider that delivers `delay` after each lock
    pub fn with_provider_delay(mut self, delay: Duration) -> Self {
        if let Some(previous) = self.provider.take() {
            previous.abort();
        }
        let provider = SimulatedProvider::new(self.orchestrator.deps().clone()).with_delay(delay);
        self.provider = Some(provider.spawn());
        self
    }

    pub fn orchestrator(&self) -> &AgreementOrchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &OrchestratorConfig {
        self.orchestrator.config()
    }

    /// The simulated ledger, when running in-process
    pub fn ledger(&self) -> Option<&Arc<SimulatedLedger>> {
        self.simulation.as_ref()
    }

    /// Credit an account on the simulated ledger
    pub async fn fund(&self, account: Address, amount: U256) -> SdkResult<()> {
        let ledger = self
            .simulation
            .as_ref()
            .ok_or_else(|| SdkError::ConfigError("funding needs a simulated ledger".to_string()))?;
        ledger.mint(account, amount).await;
        Ok(())
    }

    /// Describe a new asset owned by `publisher`
    pub fn asset(&self, name: &str, publisher: Address) -> AssetBuilder<'_> {
        AssetBuilder {
            agora: self,
            publisher,
            main: MetadataMain {
                name: name.to_string(),
                author: String::new(),
                license: "CC-BY".to_string(),
                files: Vec::new(),
            },
            services: Vec::new(),
        }
    }

    /// Seal a document and store it
    pub async fn publish(&self, mut ddo: Ddo, publisher: Address) -> SdkResult<Ddo> {
        let did = seal(&mut ddo, &self.config().did_method, publisher)?;
        let stored = self.orchestrator.deps().metadata.create_document(ddo).await?;
        info!(did = %did, %publisher, services = stored.services.len(), "Asset published");
        Ok(stored)
    }

    pub async fn resolve(&self, did: &Did) -> SdkResult<Ddo> {
        Ok(self.orchestrator.deps().metadata.get_document(did).await?)
    }

    pub async fn search(&self, query: &SearchQuery) -> SdkResult<SearchPage> {
        Ok(self.orchestrator.deps().metadata.search(query).await?)
    }

    /// Start describing an order for one service of an asset
    pub fn order(&self, did: &Did, service_index: u32) -> OrderBuilder<'_> {
        OrderBuilder {
            agora: self,
            did: did.clone(),
            service_index,
            consumer: None,
        }
    }
}

impl Drop for Agora {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            provider.abort();
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Builder for a new asset document
pub struct AssetBuilder<'a> {
    agora: &'a Agora,
    publisher: Address,
    main: MetadataMain,
    services: Vec<Service>,
}

impl<'a> AssetBuilder<'a> {
    pub fn author(mut self, author: &str) -> Self {
        self.main.author = author.to_string();
        self
    }

    pub fn license(mut self, license: &str) -> Self {
        self.main.license = license.to_string();
        self
    }

    /// Attach a file; its index is its position
    pub fn file(mut self, url: &str, checksum: &str) -> Self {
        let index = self.main.files.len() as u32;
        self.main.files.push(AssetFile {
            index,
            url: Some(url.to_string()),
            checksum: checksum.to_string(),
            content_type: None,
        });
        self
    }

    /// Add a paid service; `timeout` is in ledger blocks, `0` for none
    pub fn service(mut self, service_type: ServiceType, rewards: RewardSchedule, timeout: u64) -> Self {
        let index = self.services.len() as u32 + 1;
        self.services.push(Service {
            index,
            service_type: service_type.as_str().to_string(),
            service_endpoint: None,
            template_id: None,
            attributes: json!({"main": {
                "name": format!("{}ServiceAgreement", service_type),
                "timeout": timeout,
                "rewards": rewards,
            }}),
        });
        self
    }

    /// Add an NFT-gated access service
    pub fn nft_access(mut self, nft_amount: u64, timeout: u64) -> Self {
        let index = self.services.len() as u32 + 1;
        self.services.push(Service {
            index,
            service_type: ServiceType::NftAccess.as_str().to_string(),
            service_endpoint: None,
            template_id: None,
            attributes: json!({"main": {
                "name": "nftAccessServiceAgreement",
                "timeout": timeout,
                "nftAmount": nft_amount,
            }}),
        });
        self
    }

    /// Seal and store the document
    pub async fn publish(self) -> SdkResult<Ddo> {
        let metadata = Service {
            index: 0,
            service_type: ServiceType::Metadata.as_str().to_string(),
            service_endpoint: None,
            template_id: None,
            attributes: json!({ "main": serde_json::to_value(&self.main)? }),
        };
        let mut services = vec![metadata];
        services.extend(self.services);
        self.agora.publish(Ddo::new(services), self.publisher).await
    }
}

/// Builder for an order
pub struct OrderBuilder<'a> {
    agora: &'a Agora,
    did: Did,
    service_index: u32,
    consumer: Option<Address>,
}

impl<'a> OrderBuilder<'a> {
    pub fn consumer(mut self, consumer: Address) -> Self {
        self.consumer = Some(consumer);
        self
    }

    fn require_consumer(&self) -> SdkResult<Address> {
        self.consumer
            .ok_or_else(|| SdkError::ConfigError("an order needs a consumer".to_string()))
    }

    /// Create the agreement and hand back its saga for step-by-step driving
    pub async fn begin(self) -> SdkResult<OrderSaga> {
        let consumer = self.require_consumer()?;
        Ok(self
            .agora
            .orchestrator
            .begin_order(&self.did, self.service_index, consumer)
            .await?)
    }

    /// Run the order to its result
    pub async fn execute(self) -> SdkResult<OrderResult> {
        let consumer = self.require_consumer()?;
        Ok(self
            .agora
            .orchestrator
            .execute_order(&self.did, self.service_index, consumer)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLISHER: Address = Address::new([0xaa; 20]);

    fn rewards() -> RewardSchedule {
        RewardSchedule::new(vec![PUBLISHER], vec![U256::from(10u64)])
    }

    #[tokio::test]
    async fn test_published_asset_is_sealed_and_resolvable() {
        let agora = Agora::simulated(OrchestratorConfig::default());
        let ddo = agora
            .asset("UK Weather information 2011", PUBLISHER)
            .author("Met Office")
            .file("https://example.com/weather.csv", "085340abffh21495345af97c6b0e761")
            .service(ServiceType::Access, rewards(), 0)
            .publish()
            .await
            .unwrap();

        assert!(agora_crypto::verify(&ddo).unwrap());
        assert_eq!(ddo.publisher(), Some(PUBLISHER));
        let did = ddo.id.clone().unwrap();
        assert_eq!(agora.resolve(&did).await.unwrap(), ddo);

        let page = agora.search(&SearchQuery::text("weather")).await.unwrap();
        assert_eq!(page.total_results, 1);
    }

    #[tokio::test]
    async fn test_order_through_the_sdk() {
        let agora = Agora::simulated(OrchestratorConfig::default()).with_provider();
        let ddo = agora
            .asset("Traffic counts", PUBLISHER)
            .service(ServiceType::Access, rewards(), 0)
            .publish()
            .await
            .unwrap();
        let did = ddo.id.unwrap();
        let consumer = Address::new([0xcc; 20]);
        agora.fund(consumer, U256::from(10u64)).await.unwrap();

        let result = agora.order(&did, 1).consumer(consumer).execute().await.unwrap();
        assert!(result.access_granted);

        let ledger = agora.ledger().unwrap();
        assert_eq!(ledger.balance(&PUBLISHER).await, U256::from(10u64));
    }

    #[tokio::test]
    async fn test_order_needs_a_consumer() {
        let agora = Agora::simulated(OrchestratorConfig::default());
        let did = Did::new("nv", Bytes32::new([1; 32]));
        let err = agora.order(&did, 1).execute().await.unwrap_err();
        assert!(matches!(err, SdkError::ConfigError(_)));
    }
}
