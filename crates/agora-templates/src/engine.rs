//! Template loading and expansion

use std::collections::HashMap;

use agora_types::{
    Address, Condition, ConditionRole, ConditionState, Param, ParamType, ParamValue, RewardSchedule, ServiceType,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{TemplateError, TemplateParams, TemplateResult};

/// Reserved token for the reward amounts, rendered as a JSON array of decimal strings
pub const AMOUNTS_TOKEN: &str = "amounts";
/// Reserved token for the reward receivers, rendered as a JSON array of addresses
pub const RECEIVERS_TOKEN: &str = "receivers";
/// Reserved token for the NFT count, rendered as a decimal string
pub const NUMBER_NFTS_TOKEN: &str = "numberNfts";

const ACCESS_TEMPLATE: &str = include_str!("../templates/access.json");
const COMPUTE_TEMPLATE: &str = include_str!("../templates/compute.json");
const DID_SALE_TEMPLATE: &str = include_str!("../templates/did_sale.json");
const NFT_ACCESS_TEMPLATE: &str = include_str!("../templates/nft_access.json");
const NFT_SALE_TEMPLATE: &str = include_str!("../templates/nft_sale.json");

/// Immutable registry of condition templates keyed by service type
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    templates: HashMap<ServiceType, String>,
}

impl TemplateEngine {
    /// Engine with the bundled template of every orderable service type
    pub fn bundled() -> Self {
        Self::empty()
            .with_template(ServiceType::Access, ACCESS_TEMPLATE)
            .with_template(ServiceType::Compute, COMPUTE_TEMPLATE)
            .with_template(ServiceType::DidSale, DID_SALE_TEMPLATE)
            .with_template(ServiceType::NftAccess, NFT_ACCESS_TEMPLATE)
            .with_template(ServiceType::NftSale, NFT_SALE_TEMPLATE)
    }

    /// Engine without any template
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Register (or replace) the template of a service type
    pub fn with_template(mut self, service_type: ServiceType, template: impl Into<String>) -> Self {
        self.templates.insert(service_type, template.into());
        self
    }

    /// Raw template text of a service type
    pub fn load_template(&self, service_type: ServiceType) -> TemplateResult<&str> {
        self.templates
            .get(&service_type)
            .map(String::as_str)
            .ok_or(TemplateError::NotFound(service_type))
    }

    /// Service types with a registered template
    pub fn service_types(&self) -> Vec<ServiceType> {
        let mut types: Vec<ServiceType> = self.templates.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    /// Load and expand the template of a service type
    pub fn expand_service(
        &self,
        service_type: ServiceType,
        params: &TemplateParams,
        rewards: &RewardSchedule,
    ) -> TemplateResult<Vec<Condition>> {
        expand(self.load_template(service_type)?, params, rewards)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::bundled()
    }
}

/// Expand a template into its ordered condition list.
///
/// Any failure yields a single [`TemplateError::InitializeConditions`]; a
/// partial list is never returned.
pub fn expand(template: &str, params: &TemplateParams, rewards: &RewardSchedule) -> TemplateResult<Vec<Condition>> {
    let text = substitute(template, params, rewards)?;
    let raw: RawTemplate =
        serde_json::from_str(&text).map_err(|e| init_error(format!("malformed template: {}", e)))?;
    let conditions = raw
        .conditions
        .into_iter()
        .map(RawCondition::into_condition)
        .collect::<TemplateResult<Vec<_>>>()?;
    validate(&conditions)?;
    Ok(conditions)
}

/// Names of every placeholder token in a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match placeholder_name(after) {
            Some(name) => {
                names.push(name.to_string());
                rest = &after[name.len() + 1..];
            }
            None => rest = after,
        }
    }
    names
}

fn substitute(template: &str, params: &TemplateParams, rewards: &RewardSchedule) -> TemplateResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut unresolved: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match placeholder_name(after) {
            Some(name) => {
                match render_token(name, params, rewards)? {
                    Some(rendered) => out.push_str(&rendered),
                    None => {
                        if !unresolved.iter().any(|u| u == name) {
                            unresolved.push(name.to_string());
                        }
                    }
                }
                rest = &after[name.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    if !unresolved.is_empty() {
        return Err(init_error(format!("unresolved placeholders: {}", unresolved.join(", "))));
    }
    Ok(out)
}

/// `name` if `text` starts with `name}` and name is `[A-Za-z_][A-Za-z0-9_.]*`
fn placeholder_name(text: &str) -> Option<&str> {
    let end = text.find('}')?;
    let name = &text[..end];
    let mut chars = name.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    valid.then_some(name)
}

fn render_token(name: &str, params: &TemplateParams, rewards: &RewardSchedule) -> TemplateResult<Option<String>> {
    match name {
        AMOUNTS_TOKEN => {
            check_schedule(rewards)?;
            let amounts: Vec<String> = rewards.amounts.iter().map(|a| a.to_string()).collect();
            Ok(Some(to_json(&amounts)?))
        }
        RECEIVERS_TOKEN => {
            check_schedule(rewards)?;
            let receivers: Vec<String> = rewards.receivers.iter().map(Address::to_string).collect();
            Ok(Some(to_json(&receivers)?))
        }
        NUMBER_NFTS_TOKEN => Ok(rewards.nft_count.map(|n| format!("\"{}\"", n))),
        other => Ok(params.get(other).map(|v| v.render())),
    }
}

fn check_schedule(rewards: &RewardSchedule) -> TemplateResult<()> {
    if rewards.amounts.is_empty() {
        return Err(init_error("reward schedule has no amounts".to_string()));
    }
    if rewards.amounts.len() != rewards.receivers.len() {
        return Err(init_error(format!(
            "reward schedule has {} amounts for {} receivers",
            rewards.amounts.len(),
            rewards.receivers.len()
        )));
    }
    rewards
        .total()
        .map(|_| ())
        .map_err(|e| init_error(e.to_string()))
}

fn to_json(items: &[String]) -> TemplateResult<String> {
    serde_json::to_string(items).map_err(|e| init_error(e.to_string()))
}

fn validate(conditions: &[Condition]) -> TemplateResult<()> {
    let roles: Vec<ConditionRole> = conditions.iter().map(|c| c.role).collect();
    let ordered = matches!(
        roles.as_slice(),
        [ConditionRole::Lock, ConditionRole::Service]
            | [ConditionRole::Lock, ConditionRole::Service, ConditionRole::Reward]
    );
    if !ordered {
        return Err(init_error(format!(
            "conditions must be lock, service and an optional reward, got {:?}",
            roles
        )));
    }

    for (position, condition) in conditions.iter().enumerate() {
        if conditions[..position].iter().any(|c| c.name == condition.name) {
            return Err(init_error(format!("duplicate condition {}", condition.name)));
        }
        for param in &condition.parameters {
            if let ParamValue::ConditionRef(target) = &param.value {
                if !conditions[..position].iter().any(|c| &c.name == target) {
                    return Err(init_error(format!(
                        "{}.{} references {} which is not an earlier condition",
                        condition.name, param.name, target
                    )));
                }
            }
        }
    }
    Ok(())
}

fn init_error(reason: String) -> TemplateError {
    TemplateError::InitializeConditions(reason)
}

// =============================================================================
// Template document
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTemplate {
    conditions: Vec<RawCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCondition {
    name: String,
    contract_name: String,
    contract_address: Address,
    role: ConditionRole,
    #[serde(default)]
    timeout: u64,
    #[serde(default)]
    timelock: u64,
    #[serde(default)]
    parameters: Vec<RawParam>,
}

impl RawCondition {
    fn into_condition(self) -> TemplateResult<Condition> {
        let condition_name = self.name;
        let parameters = self
            .parameters
            .into_iter()
            .map(|p| p.into_param(&condition_name))
            .collect::<TemplateResult<Vec<_>>>()?;
        Ok(Condition {
            name: condition_name,
            contract_name: self.contract_name,
            contract_address: self.contract_address,
            role: self.role,
            state: ConditionState::Uninitialized,
            parameters,
            timeout: self.timeout,
            timelock: self.timelock,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawParam {
    name: String,
    #[serde(rename = "type")]
    param_type: ParamType,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
}

impl RawParam {
    fn into_param(self, condition: &str) -> TemplateResult<Param> {
        let value = match (self.value, self.reference) {
            (None, Some(target)) => ParamValue::ConditionRef(target),
            (Some(value), None) => literal(&value).ok_or_else(|| {
                init_error(format!("{}.{} has an unsupported value {}", condition, self.name, value))
            })?,
            _ => {
                return Err(init_error(format!(
                    "{}.{} needs exactly one of value or ref",
                    condition, self.name
                )))
            }
        };
        Ok(Param::new(self.name, self.param_type, value))
    }
}

fn literal(value: &Value) -> Option<ParamValue> {
    fn scalar(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
    match value {
        Value::Array(items) => items.iter().map(scalar).collect::<Option<Vec<_>>>().map(ParamValue::Array),
        other => scalar(other).map(ParamValue::Scalar),
    }
}
