use alloy::primitives::Bytes;
use alloy::sol_types::SolCall;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::guard;
use crate::{
    abi::MessageReceiver,
    chain_adapter::ChainAdapter,
    types::{Message, RelayOutcome, TxRequest},
    Error,
};

/// Builds, submits and confirms `receiveMessage` calls on the destination.
#[derive(Debug, Clone, Copy)]
pub struct RelayTransmitter {
    receipt_timeout: Duration,
}

impl RelayTransmitter {
    pub fn new(receipt_timeout: Duration) -> Self {
        Self { receipt_timeout }
    }

    pub fn delivery_request(message: &Message) -> TxRequest {
        let call = MessageReceiver::receiveMessageCall {
            srcAddress: message.sender,
            srcChainId: message.source_chain_id,
            data: message.payload.clone(),
            nonce: message.nonce,
        };
        TxRequest {
            to: message.destination_address,
            input: Bytes::from(call.abi_encode()),
        }
    }

    /// Relays one message the guard has cleared. Never retries.
    pub async fn relay(&self, destination: &dyn ChainAdapter, message: &Message) -> RelayOutcome {
        let handle = match destination.submit(Self::delivery_request(message)).await {
            Ok(handle) => handle,
            Err(e) => return self.settle_failure(destination, message, e).await,
        };
        info!(
            source_chain_id = %message.source_chain_id,
            nonce = %message.nonce,
            tx_hash = %handle.hash,
            "delivery submitted, waiting for receipt"
        );

        let receipt = match tokio::time::timeout(self.receipt_timeout, destination.wait_for_receipt(handle)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => return self.settle_failure(destination, message, e).await,
            Err(_) => {
                return RelayOutcome::Failed {
                    error: Error::ReceiptTimeout(self.receipt_timeout),
                }
            }
        };

        if receipt.success {
            RelayOutcome::Relayed {
                tx_hash: receipt.tx_hash,
                block_number: receipt.block_number,
            }
        } else {
            let error = Error::Reverted {
                tx_hash: receipt.tx_hash,
                block_number: receipt.block_number,
            };
            self.settle_failure(destination, message, error).await
        }
    }

    // A rejected or reverted delivery may just mean someone else delivered first.
    async fn settle_failure(&self, destination: &dyn ChainAdapter, message: &Message, error: Error) -> RelayOutcome {
        match guard::is_delivered(destination, message).await {
            Ok(true) => {
                debug!(
                    source_chain_id = %message.source_chain_id,
                    nonce = %message.nonce,
                    error = %error,
                    "delivery lost the race to another submission"
                );
                RelayOutcome::AlreadyDelivered
            }
            Ok(false) => RelayOutcome::Failed { error },
            Err(recheck) => {
                warn!(
                    source_chain_id = %message.source_chain_id,
                    nonce = %message.nonce,
                    error = %recheck,
                    "could not re-check delivery after failure"
                );
                RelayOutcome::Failed { error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_adapter::fake::FakeLedger;
    use crate::chain_adapter::MockChainAdapter;
    use crate::types::{Receipt, TxHandle};
    use alloy::primitives::{Address, B256, U256};
    use alloy::sol_types::SolValue;

    const RECEIVER: Address = Address::repeat_byte(0xbb);

    fn message(nonce: u64) -> Message {
        Message {
            source_chain_id: U256::from(5920),
            sender: Address::repeat_byte(0xaa),
            destination_chain_id: U256::from(5921),
            destination_address: RECEIVER,
            payload: Bytes::from_static(b"ping"),
            nonce: U256::from(nonce),
            source_block: 12,
            log_index: 0,
        }
    }

    fn transmitter() -> RelayTransmitter {
        RelayTransmitter::new(Duration::from_secs(5))
    }

    #[test]
    fn request_calls_receive_message() {
        let request = RelayTransmitter::delivery_request(&message(3));
        assert_eq!(request.to, RECEIVER);

        let call = MessageReceiver::receiveMessageCall::abi_decode(&request.input, true).unwrap();
        assert_eq!(call.srcAddress, Address::repeat_byte(0xaa));
        assert_eq!(call.srcChainId, U256::from(5920));
        assert_eq!(call.data, Bytes::from_static(b"ping"));
        assert_eq!(call.nonce, U256::from(3));
    }

    #[tokio::test]
    async fn successful_receipt_is_relayed() {
        let tx_hash = B256::repeat_byte(0x77);
        let mut destination = MockChainAdapter::new();
        destination
            .expect_submit()
            .times(1)
            .returning(move |_| Ok(TxHandle { hash: tx_hash }));
        destination.expect_wait_for_receipt().returning(move |handle| {
            Ok(Receipt {
                tx_hash: handle.hash,
                block_number: Some(88),
                success: true,
            })
        });

        let outcome = transmitter().relay(&destination, &message(1)).await;

        match outcome {
            RelayOutcome::Relayed { tx_hash: hash, block_number } => {
                assert_eq!(hash, tx_hash);
                assert_eq!(block_number, Some(88));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn revert_after_competing_delivery_counts_as_delivered() {
        let mut destination = MockChainAdapter::new();
        destination
            .expect_submit()
            .returning(|_| Ok(TxHandle { hash: B256::repeat_byte(1) }));
        destination.expect_wait_for_receipt().returning(|handle| {
            Ok(Receipt {
                tx_hash: handle.hash,
                block_number: Some(5),
                success: false,
            })
        });
        destination
            .expect_read_only_query()
            .times(1)
            .returning(|_, _| Ok(Bytes::from(true.abi_encode())));

        let outcome = transmitter().relay(&destination, &message(1)).await;
        assert!(matches!(outcome, RelayOutcome::AlreadyDelivered));
    }

    #[tokio::test]
    async fn revert_without_delivery_fails() {
        let mut destination = MockChainAdapter::new();
        destination
            .expect_submit()
            .returning(|_| Ok(TxHandle { hash: B256::repeat_byte(2) }));
        destination.expect_wait_for_receipt().returning(|handle| {
            Ok(Receipt {
                tx_hash: handle.hash,
                block_number: Some(5),
                success: false,
            })
        });
        destination
            .expect_read_only_query()
            .returning(|_, _| Ok(Bytes::from(false.abi_encode())));

        let outcome = transmitter().relay(&destination, &message(1)).await;
        assert!(matches!(
            outcome,
            RelayOutcome::Failed { error: Error::Reverted { .. } }
        ));
    }

    #[tokio::test]
    async fn submission_error_fails_with_cause() {
        let mut destination = MockChainAdapter::new();
        destination
            .expect_submit()
            .returning(|_| Err(Error::Chain("insufficient funds for gas".to_string())));
        destination.expect_wait_for_receipt().never();
        destination
            .expect_read_only_query()
            .returning(|_, _| Err(Error::Network("connection reset".to_string())));

        let outcome = transmitter().relay(&destination, &message(1)).await;
        match outcome {
            RelayOutcome::Failed { error: Error::Chain(reason) } => {
                assert!(reason.contains("insufficient funds"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn stalled_receipt_times_out() {
        let ledger = FakeLedger::new(5921).with_stalled_receipts();
        ledger.deploy(RECEIVER);

        let outcome = RelayTransmitter::new(Duration::from_millis(50))
            .relay(&ledger, &message(1))
            .await;

        assert!(matches!(
            outcome,
            RelayOutcome::Failed { error: Error::ReceiptTimeout(_) }
        ));
    }
}
