//! Agora CLI
//!
//! Inspect documents and agreement templates, and run the marketplace
//! flow against an in-process ledger.

use std::path::PathBuf;
use std::time::Duration;

use agora_templates::TemplateEngine;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod display;

use commands::demo::DemoOptions;
use config::{AgoraConfig, LoggingConfig};

#[derive(Parser)]
#[command(name = "agora")]
#[command(author = "Agora Team")]
#[command(version)]
#[command(about = "Agora - escrowed data and compute marketplace", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (toml, json or yaml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level or filter directive, e.g. `info` or `agora_escrow=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute service checksums and the DID of a document
    Did {
        /// DDO JSON file
        file: PathBuf,

        /// DID method, defaults to the configured one
        #[arg(short, long)]
        method: Option<String>,

        /// Seal the document as this publisher and print it
        #[arg(long, value_name = "ADDRESS")]
        seal: Option<String>,
    },

    /// Inspect agreement templates
    Template {
        #[command(subcommand)]
        action: TemplateCommands,
    },

    /// Publish an asset and order it concurrently on a simulated ledger
    Demo {
        /// Number of concurrent consumers
        #[arg(short = 'n', long, default_value = "4", value_parser = clap::value_parser!(u8).range(1..=200))]
        consumers: u8,

        /// Amount paid to the publisher
        #[arg(long, default_value = "9")]
        price: u64,

        /// Amount paid to the marketplace
        #[arg(long, default_value = "1")]
        fee: u64,

        /// Blocks the provider has to deliver, 0 for no limit
        #[arg(long, default_value = "0")]
        timeout_blocks: u64,

        /// Provider delivery delay in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,

        /// Run without a provider
        #[arg(long)]
        no_provider: bool,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List templates and their placeholders
    List,

    /// Print the raw template of a service type
    Show {
        /// Service type, e.g. `access` or `nft-sale`
        service_type: String,
    },

    /// Expand the template of a document service and derive condition IDs
    Expand {
        /// Sealed DDO JSON file
        file: PathBuf,

        /// Service index
        #[arg(short, long)]
        service: u32,

        /// Consumer address
        #[arg(long)]
        consumer: String,

        /// Agreement ID (64 hex), random when omitted
        #[arg(long)]
        agreement_id: Option<String>,
    },
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AgoraConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json_logs {
        config.logging.format = "json".to_string();
    }
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Did { file, method, seal } => {
            let method = method.unwrap_or_else(|| config.orchestrator.did_method.clone());
            commands::did::run(&file, &method, seal.as_deref())?;
        }
        Commands::Template { action } => {
            let engine = TemplateEngine::bundled();
            match action {
                TemplateCommands::List => commands::template::list(&engine)?,
                TemplateCommands::Show { service_type } => commands::template::show(&engine, &service_type)?,
                TemplateCommands::Expand {
                    file,
                    service,
                    consumer,
                    agreement_id,
                } => commands::template::expand(&config, &file, service, &consumer, agreement_id.as_deref())?,
            }
        }
        Commands::Demo {
            consumers,
            price,
            fee,
            timeout_blocks,
            delay_ms,
            no_provider,
        } => {
            let options = DemoOptions {
                consumers,
                price,
                fee,
                timeout_blocks,
                provider_delay: (!no_provider).then(|| Duration::from_millis(delay_ms)),
            };
            commands::demo::run(&config, options).await?;
        }
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}
