use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::abi;
use crate::Error;

const SUPPORTED_ADAPTERS: &[&str] = &["evm"];

fn default_adapter_type() -> String {
    "evm".to_string()
}

fn default_max_block_span() -> u64 {
    1_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_heartbeat_every() -> u64 {
    10
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

fn default_private_key_env() -> String {
    "RELAYER_PRIVATE_KEY".to_string()
}

/// One side of a lane: how to reach the chain and how hard to push it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    #[serde(default = "default_adapter_type")]
    pub adapter_type: String,
    pub rpc_url: String,
    /// Widest block range the provider accepts in a single log query.
    #[serde(default = "default_max_block_span")]
    pub max_block_span: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl ChainConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LaneConfig {
    pub source_contract: String,
    #[serde(default)]
    pub event_signature: Option<String>,
    /// Highest source block treated as already processed; scanning starts one above it.
    #[serde(default)]
    pub start_watermark: u64,
}

impl LaneConfig {
    pub fn source_contract(&self) -> Result<Address, Error> {
        Address::from_str(self.source_contract.trim()).map_err(|e| {
            Error::Config(format!("Invalid source contract {}: {}", self.source_contract, e))
        })
    }

    pub fn event_signature(&self) -> &str {
        self.event_signature
            .as_deref()
            .unwrap_or(abi::message_sent_signature())
    }

    pub fn event_topic(&self) -> B256 {
        abi::event_topic(self.event_signature())
    }
}

/// What to do with the watermark when a message in the batch does not settle.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Move past the whole scanned range regardless of per-message outcome.
    #[default]
    Advance,
    /// Stop just below the first unsettled message so it is scanned again.
    HoldBack,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_true")]
    pub ignore_foreign_destinations: bool,
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_every: default_heartbeat_every(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            failure_policy: FailurePolicy::default(),
            ignore_foreign_destinations: true,
            private_key_env: default_private_key_env(),
        }
    }
}

impl RelayerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub source: ChainConfig,
    pub destination: ChainConfig,
    pub lane: LaneConfig,
    #[serde(default)]
    pub relayer: RelayerConfig,
}

impl Config {
    /// Reads a JSON config, or TOML when the file ends in `.toml`.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, Error> {
        let path = config_path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let config = if is_toml {
            Self::from_toml_str(&config_str)?
        } else {
            Self::from_json_str(&config_str)?
        };

        config.validate()?;

        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        toml::from_str(s).map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (role, chain) in [("source", &self.source), ("destination", &self.destination)] {
            if !SUPPORTED_ADAPTERS.contains(&chain.adapter_type.as_str()) {
                return Err(Error::Config(format!(
                    "Invalid adapter type for {} chain: {}",
                    role, chain.adapter_type
                )));
            }
            if chain.rpc_url.parse::<reqwest::Url>().is_err() {
                return Err(Error::Config(format!(
                    "Invalid RPC URL for {} chain: {}",
                    role, chain.rpc_url
                )));
            }
            if chain.max_block_span == 0 {
                return Err(Error::Config(format!(
                    "max_block_span for {} chain must be greater than 0",
                    role
                )));
            }
        }

        self.lane.source_contract()?;

        if let Some(signature) = &self.lane.event_signature {
            if abi::event_topic(signature) != abi::event_topic(abi::message_sent_signature()) {
                return Err(Error::Config(format!(
                    "Unsupported event signature: {} (expected {})",
                    signature,
                    abi::message_sent_signature()
                )));
            }
        }

        if self.relayer.poll_interval_ms == 0 {
            return Err(Error::Config("Relayer poll interval must be greater than 0".to_string()));
        }
        if self.relayer.heartbeat_every == 0 {
            return Err(Error::Config("Relayer heartbeat cadence must be greater than 0".to_string()));
        }
        if self.relayer.receipt_timeout_secs == 0 {
            return Err(Error::Config("Relayer receipt timeout must be greater than 0".to_string()));
        }
        if self.relayer.private_key_env.trim().is_empty() {
            return Err(Error::Config("Relayer private key variable must be named".to_string()));
        }

        Ok(())
    }
}
