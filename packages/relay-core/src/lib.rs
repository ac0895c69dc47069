pub mod abi;
pub mod config;
pub mod types;
pub mod chain_adapter;
pub mod scanner;
pub mod decoder;
pub mod relayer;

pub use config::Config;
pub use types::{BatchReport, Message, PollOutcome, RawLog, RelayOutcome};

use alloy::primitives::B256;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transaction {tx_hash} reverted (block {block_number:?})")]
    Reverted {
        tx_hash: B256,
        block_number: Option<u64>,
    },

    #[error("No receipt after {0:?}")]
    ReceiptTimeout(Duration),
}
