use alloy::primitives::{Address, B256, U256};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    chain_adapter::{signer_from_env, ChainAdapter, ChainAdapterFactory, DefaultChainAdapterFactory},
    config::{ChainConfig, Config, FailurePolicy},
    decoder::EventDecoder,
    scanner::RangeScanner,
    types::{BatchReport, Message, PollOutcome, RelayOutcome},
    Error,
};

pub mod guard;
pub mod lane;
pub mod transmitter;

pub use guard::DeliveryStatus;
pub use lane::LaneState;
pub use transmitter::RelayTransmitter;

const PAYLOAD_PREVIEW_BYTES: usize = 32;

/// Hex of the first few payload bytes, for log lines.
fn payload_preview(payload: &[u8]) -> String {
    if payload.len() <= PAYLOAD_PREVIEW_BYTES {
        hex::encode(payload)
    } else {
        format!("{}..", hex::encode(&payload[..PAYLOAD_PREVIEW_BYTES]))
    }
}

/// Poll scheduler for a single lane.
pub struct Relayer {
    config: Config,
    source: Arc<dyn ChainAdapter>,
    destination: Arc<dyn ChainAdapter>,
    source_contract: Address,
    event_topic: B256,
    destination_chain_id: U256,
    scanner: RangeScanner,
    decoder: EventDecoder,
    transmitter: RelayTransmitter,
    state: LaneState,
}

impl Relayer {
    /// Builds both adapters and checks that each endpoint is the chain the config names.
    pub async fn new(config: Config) -> Result<Self, Error> {
        let factory = DefaultChainAdapterFactory;
        let signer = signer_from_env(&config.relayer.private_key_env)?;

        let source = factory.create_adapter(&config.source, None).await?;
        let destination = factory.create_adapter(&config.destination, Some(signer)).await?;

        Self::verify_endpoint("source", source.as_ref(), &config.source).await?;
        Self::verify_endpoint("destination", destination.as_ref(), &config.destination).await?;

        Self::with_adapters(config, source, destination)
    }

    pub fn with_adapters(
        config: Config,
        source: Arc<dyn ChainAdapter>,
        destination: Arc<dyn ChainAdapter>,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            source_contract: config.lane.source_contract()?,
            event_topic: config.lane.event_topic(),
            destination_chain_id: U256::from(config.destination.chain_id),
            scanner: RangeScanner::new(config.source.max_block_span),
            decoder: EventDecoder::new(config.source.chain_id),
            transmitter: RelayTransmitter::new(config.relayer.receipt_timeout()),
            state: LaneState::new(config.lane.start_watermark),
            source,
            destination,
            config,
        })
    }

    async fn verify_endpoint(role: &str, adapter: &dyn ChainAdapter, chain: &ChainConfig) -> Result<(), Error> {
        let chain_id = adapter.chain_id().await.map_err(|e| {
            Error::Config(format!("{} chain {} is unreachable: {}", role, chain.name, e))
        })?;
        if chain_id != chain.chain_id {
            return Err(Error::Config(format!(
                "{} chain {} reports chain id {}, expected {}",
                role, chain.name, chain_id, chain.chain_id
            )));
        }
        Ok(())
    }

    pub fn state(&self) -> &LaneState {
        &self.state
    }

    pub fn source(&self) -> &dyn ChainAdapter {
        self.source.as_ref()
    }

    pub fn destination(&self) -> &dyn ChainAdapter {
        self.destination.as_ref()
    }

    /// Fires a tick every poll interval until `shutdown` yields or closes.
    ///
    /// Ticks run as separate tasks and may overlap; the lane's in-flight flag
    /// turns overlapping ticks into no-ops. A cycle already running when
    /// shutdown arrives is awaited, never interrupted.
    pub async fn start(self: Arc<Self>, mut shutdown: mpsc::Receiver<()>) -> Result<(), Error> {
        info!(
            source = %self.config.source.name,
            source_chain_id = self.config.source.chain_id,
            destination = %self.config.destination.name,
            destination_chain_id = self.config.destination.chain_id,
            source_contract = %self.source_contract,
            relayer = ?self.destination.signer_address(),
            watermark = self.state.watermark(),
            "starting relayer"
        );

        let mut ticker = interval(self.config.relayer.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = JoinSet::new();

        loop {
            tokio::select! {
                signal = shutdown.recv() => {
                    if signal.is_some() {
                        info!("shutdown requested, no further ticks");
                    } else {
                        warn!("shutdown channel closed, no further ticks");
                    }
                    break;
                }
                _ = ticker.tick() => {
                    while let Some(done) = cycles.try_join_next() {
                        if let Err(e) = done {
                            error!(error = %e, "poll cycle task panicked");
                        }
                    }
                    let relayer = Arc::clone(&self);
                    cycles.spawn(async move { relayer.poll_once().await });
                }
            }
        }

        while let Some(done) = cycles.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "poll cycle task panicked");
            }
        }
        info!(watermark = self.state.watermark(), "relayer stopped");
        Ok(())
    }

    /// One tick: claim the lane, scan new blocks, relay what was found.
    pub async fn poll_once(&self) -> PollOutcome {
        let Some(_cycle) = self.state.try_begin() else {
            debug!("previous cycle still in flight, skipping tick");
            return PollOutcome::Skipped;
        };

        let beat = self.state.beat();
        if beat % self.config.relayer.heartbeat_every == 0 {
            info!(cycles = beat, watermark = self.state.watermark(), "relayer heartbeat");
        }

        self.run_cycle().await
    }

    async fn run_cycle(&self) -> PollOutcome {
        let head = match self.source.current_height().await {
            Ok(head) => head,
            Err(error) => {
                warn!(error = %error, "could not read source head, retrying next tick");
                return PollOutcome::HeadUnavailable { error };
            }
        };

        let watermark = self.state.watermark();
        if head <= watermark {
            debug!(head, watermark, "no new blocks");
            return PollOutcome::NoNewBlocks { head };
        }

        let (from, to) = (watermark + 1, head);
        info!(from, to, span = self.scanner.max_block_span(), "checking source blocks");

        let logs = match self
            .scanner
            .scan(self.source.as_ref(), self.source_contract, self.event_topic, from, to)
            .await
        {
            Ok(logs) => logs,
            Err(error) => {
                error!(from, to, error = %error, "range scan failed, watermark unchanged");
                return PollOutcome::ScanFailed { from, to, error };
            }
        };

        let decoded = self.decoder.decode_batch(&logs);
        if !decoded.messages.is_empty() {
            info!(from, to, count = decoded.messages.len(), "found new messages");
        }

        let mut report = self.relay_batch(&decoded.messages).await;
        report.dropped = decoded.dropped;

        let target = match (self.config.relayer.failure_policy, report.first_unsettled_block) {
            (FailurePolicy::HoldBack, Some(block)) => {
                let held = block.saturating_sub(1).min(to);
                warn!(
                    first_unsettled_block = block,
                    watermark = held.max(watermark),
                    "holding watermark below unsettled message"
                );
                held
            }
            _ => to,
        };
        let watermark = self.state.advance(target);

        info!(
            from,
            to,
            watermark,
            attempted = report.attempted(),
            relayed = report.relayed,
            already_delivered = report.already_delivered,
            undeliverable = report.undeliverable,
            failed = report.failed,
            foreign = report.foreign,
            dropped = report.dropped,
            "cycle complete"
        );

        PollOutcome::Completed {
            from,
            to,
            watermark,
            report,
        }
    }

    /// Runs every message through guard then transmitter, in order.
    /// A failure on one message never stops the rest.
    async fn relay_batch(&self, messages: &[Message]) -> BatchReport {
        let mut report = BatchReport::default();
        for message in messages {
            info!(
                source_chain_id = %message.source_chain_id,
                nonce = %message.nonce,
                sender = %message.sender,
                destination_chain_id = %message.destination_chain_id,
                destination = %message.destination_address,
                payload_len = message.payload.len(),
                payload = %payload_preview(&message.payload),
                block = message.source_block,
                log_index = message.log_index,
                "message detected"
            );

            if self.config.relayer.ignore_foreign_destinations
                && message.destination_chain_id != self.destination_chain_id
            {
                warn!(
                    source_chain_id = %message.source_chain_id,
                    nonce = %message.nonce,
                    destination_chain_id = %message.destination_chain_id,
                    "message addressed to another chain, not relaying"
                );
                report.foreign += 1;
                continue;
            }

            let outcome = self.process_message(message).await;
            match &outcome {
                RelayOutcome::Relayed { tx_hash, block_number } => info!(
                    source_chain_id = %message.source_chain_id,
                    nonce = %message.nonce,
                    tx_hash = %tx_hash,
                    block = ?block_number,
                    "message relayed"
                ),
                RelayOutcome::AlreadyDelivered => debug!(
                    source_chain_id = %message.source_chain_id,
                    nonce = %message.nonce,
                    "message already delivered, skipping"
                ),
                RelayOutcome::Undeliverable { reason } => warn!(
                    source_chain_id = %message.source_chain_id,
                    nonce = %message.nonce,
                    reason = %reason,
                    "message undeliverable this cycle"
                ),
                RelayOutcome::Failed { error } => error!(
                    source_chain_id = %message.source_chain_id,
                    nonce = %message.nonce,
                    error = %error,
                    "message relay failed"
                ),
            }
            report.record(message, &outcome);
        }
        report
    }

    async fn process_message(&self, message: &Message) -> RelayOutcome {
        match guard::check(self.destination.as_ref(), message).await {
            Ok(DeliveryStatus::Pending) => self.transmitter.relay(self.destination.as_ref(), message).await,
            Ok(DeliveryStatus::Delivered) => RelayOutcome::AlreadyDelivered,
            Ok(DeliveryStatus::NoContract) => RelayOutcome::Undeliverable {
                reason: format!(
                    "no contract at {} on {}",
                    message.destination_address, self.config.destination.name
                ),
            },
            Err(error) => RelayOutcome::Failed { error },
        }
    }
}
