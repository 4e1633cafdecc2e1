//! `agora demo` - publish an asset and order it from many consumers at once
//! against the in-process ledger

use std::sync::Arc;
use std::time::Duration;

use agora_ledger::{SimulatedLedger, TxKind};
use agora_sdk::{Address, Agora, RewardSchedule, ServiceType, U256};
use anyhow::Context;
use tracing::info;

use crate::config::AgoraConfig;
use crate::display;

const PUBLISHER: Address = Address::new([0xaa; 20]);
const MARKETPLACE: Address = Address::new([0xfe; 20]);

pub struct DemoOptions {
    pub consumers: u8,
    pub price: u64,
    pub fee: u64,
    /// Ledger blocks the provider has to deliver, `0` for no limit
    pub timeout_blocks: u64,
    /// `None` runs without a provider, so every order ends denied
    pub provider_delay: Option<Duration>,
}

pub async fn run(config: &AgoraConfig, options: DemoOptions) -> anyhow::Result<()> {
    let ledger = Arc::new(SimulatedLedger::new());
    let mut agora = Agora::simulated_with(config.orchestrator.clone(), config.contracts.clone(), ledger.clone());
    if let Some(delay) = options.provider_delay {
        agora = agora.with_provider_delay(delay);
    }

    display::section("Publishing");
    let rewards = RewardSchedule::new(
        vec![PUBLISHER, MARKETPLACE],
        vec![U256::from(options.price), U256::from(options.fee)],
    );
    let total = rewards.total()?;
    let ddo = agora
        .asset("UK Weather information 2011", PUBLISHER)
        .author("Met Office")
        .file("https://example.com/weather-2011.csv", "efb2c764274b745f5fc37f97c6b0e761")
        .service(ServiceType::Access, rewards, options.timeout_blocks)
        .publish()
        .await?;
    let did = ddo.id.clone().context("published document has no DID")?;
    display::kv("DID", &did.to_string());
    display::kv("publisher", &PUBLISHER.to_string());
    display::kv("price", &total.to_string());

    display::section(&format!("Ordering with {} consumers", options.consumers));
    let consumers: Vec<Address> = (1..=options.consumers).map(|seed| Address::new([seed; 20])).collect();
    for consumer in &consumers {
        agora.fund(*consumer, total).await?;
    }
    info!(consumers = consumers.len(), %did, "Starting concurrent orders");

    let orders = consumers
        .iter()
        .map(|consumer| agora.order(&did, 1).consumer(*consumer).execute());
    let results = futures::future::join_all(orders).await;

    let mut granted = 0;
    for (consumer, result) in consumers.iter().zip(results) {
        match result {
            Ok(result) => {
                if result.access_granted {
                    granted += 1;
                }
                display::order_result(&consumer.to_string(), &result);
            }
            Err(e) => display::failure(&format!("{} failed: {}", consumer, e)),
        }
    }

    display::section("Ledger");
    display::kv("publisher balance", &ledger.balance(&PUBLISHER).await.to_string());
    display::kv("marketplace balance", &ledger.balance(&MARKETPLACE).await.to_string());
    let transactions = ledger.transactions().await;
    for kind in [
        TxKind::CreateAgreement,
        TxKind::FulfillLock,
        TxKind::FulfillCondition,
        TxKind::FulfillReward,
    ] {
        let count = transactions.iter().filter(|t| t.kind == kind).count();
        display::kv(&format!("{:?}", kind), &count.to_string());
    }

    println!();
    if granted == consumers.len() {
        display::success(&format!("All {} orders granted", granted));
    } else {
        display::info(&format!("{} of {} orders granted", granted, consumers.len()));
    }
    Ok(())
}
