//! Runtime parameters bound into a template

use std::collections::BTreeMap;

use agora_types::{Address, Bytes32, ContractAddresses, U256};

/// A scalar value substituted for a `{name}` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// Inserted verbatim
    Text(String),
    /// Rendered as `0x`-prefixed lowercase hex
    Bytes(Vec<u8>),
    /// Rendered as a decimal integer
    Uint(U256),
}

impl TemplateValue {
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => format!("0x{}", hex::encode(b)),
            Self::Uint(u) => u.to_string(),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Address> for TemplateValue {
    fn from(value: Address) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<Bytes32> for TemplateValue {
    fn from(value: Bytes32) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<U256> for TemplateValue {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for TemplateValue {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

/// Named parameters for one expansion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams {
    values: BTreeMap<String, TemplateValue>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Bind every `{contracts.<name>}` token
    pub fn with_contracts(mut self, contracts: &ContractAddresses) -> Self {
        for (name, address) in contracts.placeholders() {
            self.insert(name, address);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
