//! CLI configuration
//!
//! Layered the usual way: defaults, then an optional file, then
//! `config/default` and `config/local`, then `AGORA__*` environment
//! variables (e.g. `AGORA__ORCHESTRATOR__SERVICE_TIMEOUT_MS=5000`).

use agora_escrow::OrchestratorConfig;
use agora_types::ContractAddresses;
use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgoraConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Contract addresses; the environment layer lowercases keys, so these
    /// are best overridden from a file
    #[serde(default)]
    pub contracts: ContractAddresses,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl AgoraConfig {
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("AGORA")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build().context("reading configuration")?;
        config.try_deserialize().context("invalid configuration")
    }
}
