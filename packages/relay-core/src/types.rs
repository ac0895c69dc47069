use alloy::primitives::{Address, Bytes, B256, U256};
use std::fmt;

use crate::Error;

/// A log entry exactly as the source ledger returned it, before decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<B256>,
}

/// A decoded outbound message. Built once by the decoder and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub source_chain_id: U256,
    pub sender: Address,
    pub destination_chain_id: U256,
    pub destination_address: Address,
    pub payload: Bytes,
    pub nonce: U256,
    pub source_block: u64,
    pub log_index: u64,
}

impl Message {
    /// The `(source_chain_id, nonce)` idempotency key.
    pub fn key(&self) -> (U256, U256) {
        (self.source_chain_id, self.nonce)
    }

    /// Position of the originating event on the source chain.
    pub fn position(&self) -> (u64, u64) {
        (self.source_block, self.log_index)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message {}/{} ({} -> {}@{})",
            self.source_chain_id,
            self.nonce,
            self.sender,
            self.destination_address,
            self.destination_chain_id
        )
    }
}

/// An unsigned call the destination adapter signs and broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub input: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle {
    pub hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Result of one relay attempt.
#[derive(Debug)]
pub enum RelayOutcome {
    Relayed {
        tx_hash: B256,
        block_number: Option<u64>,
    },
    /// The destination already recorded the key, either before submission or
    /// because another delivery won the race.
    AlreadyDelivered,
    /// No contract at the destination address.
    Undeliverable { reason: String },
    Failed { error: Error },
}

impl RelayOutcome {
    /// Whether the message reached a final state on the destination.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Relayed { .. } | Self::AlreadyDelivered)
    }
}

/// Per-cycle tally of what happened to the scanned range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub relayed: usize,
    pub already_delivered: usize,
    pub undeliverable: usize,
    pub failed: usize,
    pub foreign: usize,
    pub dropped: usize,
    /// Source block of the first message that was neither relayed nor found delivered.
    pub first_unsettled_block: Option<u64>,
}

impl BatchReport {
    pub fn record(&mut self, message: &Message, outcome: &RelayOutcome) {
        match outcome {
            RelayOutcome::Relayed { .. } => self.relayed += 1,
            RelayOutcome::AlreadyDelivered => self.already_delivered += 1,
            RelayOutcome::Undeliverable { .. } => self.undeliverable += 1,
            RelayOutcome::Failed { .. } => self.failed += 1,
        }
        if !outcome.is_settled() && self.first_unsettled_block.is_none() {
            self.first_unsettled_block = Some(message.source_block);
        }
    }

    pub fn attempted(&self) -> usize {
        self.relayed + self.already_delivered + self.undeliverable + self.failed
    }
}

/// What a single scheduler tick did.
#[derive(Debug)]
pub enum PollOutcome {
    /// A previous cycle was still running.
    Skipped,
    HeadUnavailable { error: Error },
    NoNewBlocks { head: u64 },
    ScanFailed { from: u64, to: u64, error: Error },
    Completed {
        from: u64,
        to: u64,
        watermark: u64,
        report: BatchReport,
    },
}
