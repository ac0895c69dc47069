//! Delivery guard: asks the destination whether a message key is already recorded.

use alloy::primitives::Bytes;
use alloy::sol_types::{SolCall, SolValue};

use crate::{abi::MessageReceiver, chain_adapter::ChainAdapter, types::Message, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    /// Nothing is deployed at the destination address.
    NoContract,
}

/// Full pre-relay check: contract presence first, then the processed predicate.
pub async fn check(destination: &dyn ChainAdapter, message: &Message) -> Result<DeliveryStatus, Error> {
    if !destination.code_exists_at(message.destination_address).await? {
        return Ok(DeliveryStatus::NoContract);
    }
    if is_delivered(destination, message).await? {
        Ok(DeliveryStatus::Delivered)
    } else {
        Ok(DeliveryStatus::Pending)
    }
}

/// `processedMessages(sourceChainId, nonce)` on the destination contract.
pub async fn is_delivered(destination: &dyn ChainAdapter, message: &Message) -> Result<bool, Error> {
    let (source_chain_id, nonce) = message.key();
    let call = MessageReceiver::processedMessagesCall {
        srcChainId: source_chain_id,
        nonce,
    };
    let output = destination
        .read_only_query(message.destination_address, Bytes::from(call.abi_encode()))
        .await?;
    <bool as SolValue>::abi_decode(&output, true)
        .map_err(|e| Error::Decode(format!("processedMessages returned {}: {}", output, e)))
}
