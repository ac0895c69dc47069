//! On-chain interface of a relay lane.
//!
//! The source contract emits `MessageSent`; the destination contract exposes the
//! `processedMessages` idempotency predicate and the `receiveMessage` entry point.

use alloy::primitives::{keccak256, B256};
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    event MessageSent(
        address indexed sender,
        uint256 indexed dstChainId,
        address indexed dstAddress,
        bytes data,
        uint256 nonce
    );

    interface MessageReceiver {
        function processedMessages(uint256 srcChainId, uint256 nonce) external view returns (bool);
        function receiveMessage(address srcAddress, uint256 srcChainId, bytes data, uint256 nonce) external;
    }
}

/// Canonical signature of the watched event.
pub fn message_sent_signature() -> &'static str {
    MessageSent::SIGNATURE
}

/// topic0 for a textual event signature such as `MessageSent(address,uint256,address,bytes,uint256)`.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}
