//! EVM JSON-RPC adapter built on alloy.

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::Http;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::ChainAdapter;
use crate::{
    config::ChainConfig,
    types::{RawLog, Receipt, TxHandle, TxRequest},
    Error,
};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Reads the relayer's signing key from the environment variable `var`.
pub fn signer_from_env(var: &str) -> Result<PrivateKeySigner, Error> {
    let key = std::env::var(var)
        .map_err(|_| Error::Config(format!("{} environment variable is not set", var)))?;
    parse_signer(&key)
}

fn parse_signer(key: &str) -> Result<PrivateKeySigner, Error> {
    let key = key.trim();
    PrivateKeySigner::from_str(key.strip_prefix("0x").unwrap_or(key))
        .map_err(|e| Error::Config(format!("Invalid relayer private key: {}", e)))
}

/// `base * 2^attempt`, capped at [`MAX_RETRY_DELAY`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

pub struct EvmAdapter {
    name: String,
    provider: DynProvider,
    signer: Option<Address>,
    max_retries: u32,
    retry_delay: Duration,
    receipt_poll_interval: Duration,
}

impl EvmAdapter {
    /// Connects lazily; nothing is sent until the first call.
    pub fn new(config: &ChainConfig, signer: Option<PrivateKeySigner>) -> Result<Self, Error> {
        let url = config
            .rpc_url
            .parse::<reqwest::Url>()
            .map_err(|e| Error::Config(format!("Invalid RPC URL {}: {}", config.rpc_url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;
        let client = RpcClient::new(Http::with_client(http, url), false);

        let signer_address = signer.as_ref().map(|s| s.address());
        let provider = match signer {
            Some(signer) => ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .on_client(client)
                .erased(),
            None => ProviderBuilder::new().on_client(client).erased(),
        };

        Ok(Self {
            name: config.name.clone(),
            provider,
            signer: signer_address,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            receipt_poll_interval: RECEIPT_POLL_INTERVAL,
        })
    }

    async fn retry_with_backoff<F, Fut, T>(&self, what: &str, operation: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(chain = %self.name, call = what, attempt = attempt + 1, "rpc call recovered");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::Network(format!(
                            "[{}] {} failed after {} attempts: {}",
                            self.name,
                            what,
                            attempt + 1,
                            e
                        )));
                    }
                    let delay = backoff_delay(self.retry_delay, attempt);
                    warn!(
                        chain = %self.name,
                        call = what,
                        attempt = attempt + 1,
                        retry_in = ?delay,
                        error = %e,
                        "rpc call failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn to_raw_log(log: Log) -> RawLog {
        RawLog {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain_type(&self) -> &'static str {
        "evm"
    }

    fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    async fn chain_id(&self) -> Result<u64, Error> {
        self.retry_with_backoff("eth_chainId", || async { self.provider.get_chain_id().await })
            .await
    }

    async fn current_height(&self) -> Result<u64, Error> {
        self.retry_with_backoff("eth_blockNumber", || async {
            self.provider.get_block_number().await
        })
        .await
    }

    async fn get_logs(
        &self,
        address: Address,
        event_signature: B256,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<RawLog>, Error> {
        let filter = Filter::new()
            .address(address)
            .event_signature(event_signature)
            .from_block(from_height)
            .to_block(to_height);

        let logs = self
            .retry_with_backoff("eth_getLogs", || async { self.provider.get_logs(&filter).await })
            .await?;

        Ok(logs
            .into_iter()
            .filter(|log| {
                if log.removed {
                    warn!(
                        chain = %self.name,
                        block = ?log.block_number,
                        log_index = ?log.log_index,
                        "discarding log removed by reorg"
                    );
                }
                !log.removed
            })
            .map(Self::to_raw_log)
            .collect())
    }

    async fn code_exists_at(&self, address: Address) -> Result<bool, Error> {
        let code = self
            .retry_with_backoff("eth_getCode", || async { self.provider.get_code_at(address).await })
            .await?;
        Ok(!code.is_empty())
    }

    async fn read_only_query(&self, address: Address, call: Bytes) -> Result<Bytes, Error> {
        let tx = TransactionRequest::default().with_to(address).with_input(call);
        self.retry_with_backoff("eth_call", || async { self.provider.call(&tx).await })
            .await
    }

    async fn submit(&self, tx: TxRequest) -> Result<TxHandle, Error> {
        if self.signer.is_none() {
            return Err(Error::Config(format!("[{}] adapter has no signer", self.name)));
        }
        let request = TransactionRequest::default().with_to(tx.to).with_input(tx.input);
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| Error::Chain(format!("[{}] failed to send transaction: {}", self.name, e)))?;
        Ok(TxHandle { hash: *pending.tx_hash() })
    }

    async fn wait_for_receipt(&self, handle: TxHandle) -> Result<Receipt, Error> {
        loop {
            let receipt = self
                .retry_with_backoff("eth_getTransactionReceipt", || async {
                    self.provider.get_transaction_receipt(handle.hash).await
                })
                .await?;

            if let Some(receipt) = receipt {
                return Ok(Receipt {
                    tx_hash: receipt.transaction_hash,
                    block_number: receipt.block_number,
                    success: receipt.status(),
                });
            }
            sleep(self.receipt_poll_interval).await;
        }
    }
}
