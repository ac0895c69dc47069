//! Turns raw `MessageSent` logs into typed [`Message`]s.

use alloy::primitives::U256;
use alloy::sol_types::SolEvent;
use tracing::warn;

use crate::{
    abi::MessageSent,
    types::{Message, RawLog},
    Error,
};

/// Output of [`EventDecoder::decode_batch`].
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub messages: Vec<Message>,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct EventDecoder {
    source_chain_id: U256,
}

impl EventDecoder {
    pub fn new(source_chain_id: u64) -> Self {
        Self {
            source_chain_id: U256::from(source_chain_id),
        }
    }

    pub fn decode(&self, log: &RawLog) -> Result<Message, Error> {
        let source_block = log
            .block_number
            .ok_or_else(|| Error::Decode("log has no block number".to_string()))?;
        let log_index = log
            .log_index
            .ok_or_else(|| Error::Decode("log has no log index".to_string()))?;

        let event = MessageSent::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| Error::Decode(e.to_string()))?;

        Ok(Message {
            source_chain_id: self.source_chain_id,
            sender: event.sender,
            destination_chain_id: event.dstChainId,
            destination_address: event.dstAddress,
            payload: event.data,
            nonce: event.nonce,
            source_block,
            log_index,
        })
    }

    /// Decodes every log it can, dropping the rest with a warning.
    ///
    /// Messages come back ordered by `(source_block, log_index)`.
    pub fn decode_batch(&self, logs: &[RawLog]) -> DecodedBatch {
        let mut batch = DecodedBatch::default();
        for log in logs {
            match self.decode(log) {
                Ok(message) => batch.messages.push(message),
                Err(e) => {
                    batch.dropped += 1;
                    warn!(
                        source_chain_id = %self.source_chain_id,
                        block = ?log.block_number,
                        log_index = ?log.log_index,
                        tx_hash = ?log.transaction_hash,
                        error = %e,
                        "dropping malformed log"
                    );
                }
            }
        }
        batch.messages.sort_by_key(Message::position);
        batch
    }
}
