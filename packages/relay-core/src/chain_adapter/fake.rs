//! In-memory ledger for exercising the relay pipeline without a node.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolEvent, SolValue};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::ChainAdapter;
use crate::abi::{MessageReceiver, MessageSent};
use crate::types::{RawLog, Receipt, TxHandle, TxRequest};
use crate::Error;

#[derive(Default)]
struct State {
    head: u64,
    logs: Vec<RawLog>,
    contracts: HashSet<Address>,
    processed: HashSet<(U256, U256)>,
    receipts: HashMap<B256, Receipt>,
    log_queries: Vec<(u64, u64)>,
    fail_log_queries_from: Option<u64>,
    fail_submit_nonces: HashSet<U256>,
    revert_nonces: HashSet<U256>,
    delivered: Vec<(U256, U256)>,
    submissions: u64,
}

#[derive(Default)]
pub(crate) struct FakeLedger {
    chain_id: u64,
    signer: Option<Address>,
    state: Mutex<State>,
    head_gate: Mutex<Option<Arc<Notify>>>,
    stall_receipts: bool,
}

impl FakeLedger {
    pub(crate) fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            signer: Some(Address::repeat_byte(0xee)),
            ..Default::default()
        }
    }

    pub(crate) fn with_stalled_receipts(mut self) -> Self {
        self.stall_receipts = true;
        self
    }

    pub(crate) fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub(crate) fn deploy(&self, address: Address) {
        self.state.lock().unwrap().contracts.insert(address);
    }

    pub(crate) fn push_log(&self, log: RawLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    /// Emits a well-formed `MessageSent` from `contract`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn emit(
        &self,
        contract: Address,
        sender: Address,
        dst_chain_id: u64,
        dst_address: Address,
        data: &[u8],
        nonce: u64,
        block: u64,
        log_index: u64,
    ) {
        self.push_log(message_log(
            contract,
            sender,
            dst_chain_id,
            dst_address,
            data,
            nonce,
            block,
            log_index,
        ));
    }

    pub(crate) fn mark_processed(&self, source_chain_id: u64, nonce: u64) {
        self.state
            .lock()
            .unwrap()
            .processed
            .insert((U256::from(source_chain_id), U256::from(nonce)));
    }

    pub(crate) fn fail_log_queries_from(&self, height: u64) {
        self.state.lock().unwrap().fail_log_queries_from = Some(height);
    }

    pub(crate) fn fail_submit_for(&self, nonce: u64) {
        self.state.lock().unwrap().fail_submit_nonces.insert(U256::from(nonce));
    }

    pub(crate) fn clear_submit_failures(&self) {
        self.state.lock().unwrap().fail_submit_nonces.clear();
    }

    pub(crate) fn revert_for(&self, nonce: u64) {
        self.state.lock().unwrap().revert_nonces.insert(U256::from(nonce));
    }

    /// Blocks every `current_height` call until the returned handle is notified.
    pub(crate) fn gate_heads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.head_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn log_queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().log_queries.clone()
    }

    /// `(source_chain_id, nonce)` of every successful `receiveMessage`, in order.
    pub(crate) fn delivered(&self) -> Vec<(U256, U256)> {
        self.state.lock().unwrap().delivered.clone()
    }

    pub(crate) fn submissions(&self) -> u64 {
        self.state.lock().unwrap().submissions
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn message_log(
    contract: Address,
    sender: Address,
    dst_chain_id: u64,
    dst_address: Address,
    data: &[u8],
    nonce: u64,
    block: u64,
    log_index: u64,
) -> RawLog {
    let event = MessageSent {
        sender,
        dstChainId: U256::from(dst_chain_id),
        dstAddress: dst_address,
        data: Bytes::copy_from_slice(data),
        nonce: U256::from(nonce),
    };
    let encoded = event.encode_log_data();
    RawLog {
        address: contract,
        topics: encoded.topics().to_vec(),
        data: encoded.data.clone(),
        block_number: Some(block),
        log_index: Some(log_index),
        transaction_hash: Some(keccak256(block.to_be_bytes())),
    }
}

#[async_trait]
impl ChainAdapter for FakeLedger {
    fn chain_type(&self) -> &'static str {
        "fake"
    }

    fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    async fn chain_id(&self) -> Result<u64, Error> {
        Ok(self.chain_id)
    }

    async fn current_height(&self) -> Result<u64, Error> {
        let gate = self.head_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.state.lock().unwrap().head)
    }

    async fn get_logs(
        &self,
        address: Address,
        event_signature: B256,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<RawLog>, Error> {
        let mut state = self.state.lock().unwrap();
        state.log_queries.push((from_height, to_height));
        if let Some(bad) = state.fail_log_queries_from {
            if to_height >= bad {
                return Err(Error::Network(format!("eth_getLogs {}..{} timed out", from_height, to_height)));
            }
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == address)
            .filter(|log| log.topics.first() == Some(&event_signature))
            .filter(|log| {
                log.block_number
                    .map(|b| b >= from_height && b <= to_height)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn code_exists_at(&self, address: Address) -> Result<bool, Error> {
        Ok(self.state.lock().unwrap().contracts.contains(&address))
    }

    async fn read_only_query(&self, address: Address, call: Bytes) -> Result<Bytes, Error> {
        let state = self.state.lock().unwrap();
        if !state.contracts.contains(&address) {
            return Ok(Bytes::new());
        }
        let query = MessageReceiver::processedMessagesCall::abi_decode(&call, true)
            .map_err(|e| Error::Chain(format!("execution reverted: {}", e)))?;
        let processed = state.processed.contains(&(query.srcChainId, query.nonce));
        Ok(Bytes::from(processed.abi_encode()))
    }

    async fn submit(&self, tx: TxRequest) -> Result<TxHandle, Error> {
        let mut state = self.state.lock().unwrap();
        let call = MessageReceiver::receiveMessageCall::abi_decode(&tx.input, true)
            .map_err(|e| Error::Chain(format!("bad calldata: {}", e)))?;
        if state.fail_submit_nonces.contains(&call.nonce) {
            return Err(Error::Chain(format!("nonce {} rejected by node", call.nonce)));
        }

        state.submissions += 1;
        let hash = keccak256([tx.input.as_ref(), &state.submissions.to_be_bytes()[..]].concat());
        let key = (call.srcChainId, call.nonce);
        let success = state.contracts.contains(&tx.to)
            && !state.revert_nonces.contains(&call.nonce)
            && state.processed.insert(key);
        if success {
            state.delivered.push(key);
        }
        let block_number = Some(state.head);
        state.receipts.insert(
            hash,
            Receipt {
                tx_hash: hash,
                block_number,
                success,
            },
        );
        Ok(TxHandle { hash })
    }

    async fn wait_for_receipt(&self, handle: TxHandle) -> Result<Receipt, Error> {
        if self.stall_receipts {
            std::future::pending::<()>().await;
        }
        self.state
            .lock()
            .unwrap()
            .receipts
            .get(&handle.hash)
            .cloned()
            .ok_or_else(|| Error::Chain(format!("unknown transaction {}", handle.hash)))
    }
}
