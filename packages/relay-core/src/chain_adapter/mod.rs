use alloy::primitives::{Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    config::ChainConfig,
    types::{RawLog, Receipt, TxHandle, TxRequest},
    Error,
};

/// Ledger client capabilities the relay core needs from one chain.
///
/// The same adapter can serve as source, destination, or both.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Adapter family, e.g. `"evm"`.
    fn chain_type(&self) -> &'static str;

    /// Address that signs submitted transactions, if this adapter can submit.
    fn signer_address(&self) -> Option<Address>;

    async fn chain_id(&self) -> Result<u64, Error>;

    async fn current_height(&self) -> Result<u64, Error>;

    /// Logs emitted by `address` with topic0 `event_signature` in the closed range `[from_height, to_height]`.
    async fn get_logs(
        &self,
        address: Address,
        event_signature: B256,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<RawLog>, Error>;

    async fn code_exists_at(&self, address: Address) -> Result<bool, Error>;

    /// Read-only contract call with ABI-encoded calldata.
    async fn read_only_query(&self, address: Address, call: Bytes) -> Result<Bytes, Error>;

    /// Signs and broadcasts `tx`.
    async fn submit(&self, tx: TxRequest) -> Result<TxHandle, Error>;

    /// Resolves once the transaction is included, successfully or not.
    async fn wait_for_receipt(&self, handle: TxHandle) -> Result<Receipt, Error>;
}

/// Builds adapters from chain configuration.
#[async_trait]
pub trait ChainAdapterFactory: Send + Sync {
    async fn create_adapter(
        &self,
        config: &ChainConfig,
        signer: Option<PrivateKeySigner>,
    ) -> Result<Arc<dyn ChainAdapter>, Error>;
}

pub struct DefaultChainAdapterFactory;

#[async_trait]
impl ChainAdapterFactory for DefaultChainAdapterFactory {
    async fn create_adapter(
        &self,
        config: &ChainConfig,
        signer: Option<PrivateKeySigner>,
    ) -> Result<Arc<dyn ChainAdapter>, Error> {
        match config.adapter_type.as_str() {
            "evm" => {
                let adapter = EvmAdapter::new(config, signer)?;
                Ok(Arc::new(adapter))
            }
            _ => Err(Error::Chain(format!("Unsupported adapter type: {}", config.adapter_type))),
        }
    }
}

pub mod evm;

#[cfg(test)]
pub(crate) mod fake;

pub use evm::{signer_from_env, EvmAdapter};
