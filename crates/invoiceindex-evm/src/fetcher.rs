//! Log source abstraction and per-window log fetching.
//!
//! The index loop only needs two JSON-RPC calls: `eth_blockNumber` for the
//! head and `eth_getLogs` for a bounded block range. Anything that can answer
//! those (an HTTP node, a mock chain in tests) is a [`LogSource`].

use async_trait::async_trait;
use std::sync::Arc;

use invoiceindex_core::error::IndexerError;
use invoiceindex_core::scanner::ScanWindow;
use invoiceindex_core::types::{LogFilter, RawLog};

/// Chain access used by the index loop.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current head block number.
    async fn get_block_number(&self) -> Result<u64, IndexerError>;

    /// Logs matching `filter` in the inclusive range `[from, to]`.
    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError>;
}

#[async_trait]
impl<T: LogSource + ?Sized> LogSource for Arc<T> {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        (**self).get_block_number().await
    }

    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError> {
        (**self).get_logs(filter, from, to).await
    }
}

/// Fetch every filter's logs for `window` and merge them.
///
/// Filters are queried one after another; any failure fails the whole window
/// so the caller never applies a partial view of it. Logs outside the window
/// or not matching their filter are dropped.
pub async fn fetch_window<L: LogSource + ?Sized>(
    source: &L,
    filters: &[LogFilter],
    window: ScanWindow,
) -> Result<Vec<RawLog>, IndexerError> {
    let mut all_logs = Vec::new();
    for filter in filters {
        let logs = source.get_logs(filter, window.from, window.to).await?;
        let fetched = logs.len();
        all_logs.extend(logs.into_iter().filter(|log| {
            filter.matches(log) && log.block_number >= window.from && log.block_number <= window.to
        }));
        tracing::trace!(
            address = %filter.address,
            topic0 = %filter.topic0,
            %window,
            fetched,
            "eth_getLogs"
        );
    }
    Ok(all_logs)
}
