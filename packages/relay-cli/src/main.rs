use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_core::{relayer::Relayer, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a lane config
    ValidateConfig {
        /// Config file (.json or .toml)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Connect to both chains and report what the relayer would see
    Check {
        /// Config file (.json or .toml)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Run the relayer until interrupted
    Start {
        /// Config file (.json or .toml)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
}

#[derive(Tabled)]
struct ChainRow {
    role: &'static str,
    name: String,
    #[tabled(rename = "chain id")]
    chain_id: u64,
    adapter: String,
    rpc: String,
    #[tabled(rename = "block span")]
    max_block_span: u64,
    retries: u32,
}

#[derive(Tabled)]
struct SettingRow {
    setting: &'static str,
    value: String,
}

fn chain_row(role: &'static str, chain: &relay_core::config::ChainConfig) -> ChainRow {
    ChainRow {
        role,
        name: chain.name.clone(),
        chain_id: chain.chain_id,
        adapter: chain.adapter_type.clone(),
        rpc: chain.rpc_url.clone(),
        max_block_span: chain.max_block_span,
        retries: chain.max_retries,
    }
}

fn print_summary(config: &Config) {
    let chains = vec![
        chain_row("source", &config.source),
        chain_row("destination", &config.destination),
    ];
    println!("{}", Table::new(chains));

    let settings = vec![
        SettingRow {
            setting: "source contract",
            value: config.lane.source_contract.clone(),
        },
        SettingRow {
            setting: "event",
            value: config.lane.event_signature().to_string(),
        },
        SettingRow {
            setting: "start watermark",
            value: config.lane.start_watermark.to_string(),
        },
        SettingRow {
            setting: "poll interval",
            value: format!("{:?}", config.relayer.poll_interval()),
        },
        SettingRow {
            setting: "receipt timeout",
            value: format!("{:?}", config.relayer.receipt_timeout()),
        },
        SettingRow {
            setting: "failure policy",
            value: format!("{:?}", config.relayer.failure_policy),
        },
        SettingRow {
            setting: "ignore foreign destinations",
            value: config.relayer.ignore_foreign_destinations.to_string(),
        },
        SettingRow {
            setting: "private key variable",
            value: config.relayer.private_key_env.clone(),
        },
    ];
    println!("{}", Table::new(settings));
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            info!("Validating config file: {:?}", config);
            let config = Config::load(&config).with_context(|| format!("loading {}", config.display()))?;
            println!("Config is valid.");
            print_summary(&config);
            Ok(())
        }
        Commands::Check { config } => {
            let config = Config::load(&config).with_context(|| format!("loading {}", config.display()))?;
            let relayer = Relayer::new(config.clone()).await?;

            let source_head = relayer.source().current_height().await?;
            let destination_head = relayer.destination().current_height().await?;
            println!(
                "source      {} (chain {}) head {}",
                config.source.name, config.source.chain_id, source_head
            );
            println!(
                "destination {} (chain {}) head {}",
                config.destination.name, config.destination.chain_id, destination_head
            );
            match relayer.destination().signer_address() {
                Some(address) => println!("relayer     {}", address),
                None => println!("relayer     <no signer>"),
            }
            let contract = config.lane.source_contract()?;
            if !relayer.source().code_exists_at(contract).await? {
                println!("warning: no code at source contract {}", contract);
            }
            Ok(())
        }
        Commands::Start { config } => {
            info!("Using config file: {:?}", config);
            let config = Config::load(&config).with_context(|| format!("loading {}", config.display()))?;

            let relayer = Arc::new(Relayer::new(config).await?);
            info!("Relayer initialized");

            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(()).await;
                }
            });

            if let Err(e) = relayer.start(shutdown_rx).await {
                error!("Relayer exited with error: {}", e);
                return Err(e.into());
            }

            Ok(())
        }
    }
}
