//! `agora template` - inspect and expand agreement templates

use std::path::Path;

use agora_crypto::{agreement_id_bytes, derive_agreement_id};
use agora_escrow::OrderPlan;
use agora_templates::{placeholders, TemplateEngine};
use agora_types::{Address, ParamValue, ServiceType};
use colored::Colorize;

use crate::commands::did::read_ddo;
use crate::config::AgoraConfig;
use crate::display;

pub fn list(engine: &TemplateEngine) -> anyhow::Result<()> {
    display::section("Agreement templates");
    for service_type in engine.service_types() {
        let template = engine.load_template(service_type)?;
        let mut names = placeholders(template);
        names.sort();
        names.dedup();
        display::kv(service_type.as_str(), &names.join(", "));
    }
    Ok(())
}

pub fn show(engine: &TemplateEngine, service_type: &str) -> anyhow::Result<()> {
    let service_type: ServiceType = service_type.parse()?;
    println!("{}", engine.load_template(service_type)?);
    Ok(())
}

/// Expand the template of one service and derive its condition IDs
pub fn expand(
    config: &AgoraConfig,
    ddo_path: &Path,
    service_index: u32,
    consumer: &str,
    agreement_id: Option<&str>,
) -> anyhow::Result<()> {
    let ddo = read_ddo(ddo_path)?;
    let consumer = Address::parse(consumer)?;
    let engine = TemplateEngine::bundled();
    let plan = OrderPlan::build(&ddo, service_index, consumer, &engine, &config.contracts)?;

    let agreement_id = match agreement_id {
        Some(id) => id.to_string(),
        None => derive_agreement_id(),
    };
    let bound = plan.bind(&agreement_id_bytes(&agreement_id)?)?;

    display::section(&format!("{} service {}", plan.service_type, plan.service_index));
    display::kv("DID", &plan.did.to_string());
    display::kv("agreement", &format!("0x{}", agreement_id.trim_start_matches("0x")));
    display::kv("template", &plan.template_id.to_string());
    display::kv("publisher", &plan.publisher.to_string());
    display::kv("price", &plan.price.to_string());

    for condition in &bound {
        display::section(&format!("{} ({})", condition.name(), condition.condition.role));
        display::kv("contract", &format!("{} {}", condition.condition.contract_name, condition.contract_address()));
        display::kv("id", &condition.id.to_string().bold().to_string());
        display::kv("values hash", &condition.values_hash.to_string());
        display::kv(
            "timeout / timelock",
            &format!("{} / {}", condition.condition.timeout, condition.condition.timelock),
        );
        for param in &condition.condition.parameters {
            display::kv(&format!("  {} {}", param.param_type, param.name), &render(&param.value));
        }
    }
    Ok(())
}

fn render(value: &ParamValue) -> String {
    match value {
        ParamValue::Scalar(text) => text.clone(),
        ParamValue::Array(items) => format!("[{}]", items.join(", ")),
        ParamValue::ConditionRef(name) => format!("-> {}", name),
    }
}
