//! Range scanner: splits a block interval into provider-sized chunks.

use alloy::primitives::{Address, B256};
use tracing::debug;

use crate::{chain_adapter::ChainAdapter, types::RawLog, Error};

/// Consecutive closed sub-ranges of `[from, to]`, each at most `max_span` blocks wide.
///
/// Yields nothing when `from > to`.
pub fn sub_ranges(from: u64, to: u64, max_span: u64) -> impl Iterator<Item = (u64, u64)> {
    let span = max_span.max(1);
    let mut next = Some(from).filter(|start| *start <= to);
    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(span - 1).min(to);
        next = if end >= to { None } else { Some(end + 1) };
        Some((start, end))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeScanner {
    max_block_span: u64,
}

impl RangeScanner {
    pub fn new(max_block_span: u64) -> Self {
        Self {
            max_block_span: max_block_span.max(1),
        }
    }

    pub fn max_block_span(&self) -> u64 {
        self.max_block_span
    }

    /// Fetches every matching log in `[from, to]`, in block order.
    ///
    /// Chunks are queried one after another; the first failing chunk aborts the
    /// scan and nothing collected so far is returned.
    pub async fn scan(
        &self,
        client: &dyn ChainAdapter,
        address: Address,
        event_signature: B256,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, Error> {
        let mut logs = Vec::new();
        for (start, end) in sub_ranges(from, to, self.max_block_span) {
            let chunk = client.get_logs(address, event_signature, start, end).await?;
            if !chunk.is_empty() {
                debug!(from = start, to = end, count = chunk.len(), "chunk returned logs");
            }
            logs.extend(chunk);
        }
        Ok(logs)
    }
}
