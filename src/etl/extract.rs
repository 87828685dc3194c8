/// Extract Module
///
/// Handles fetching blocks and transaction details from the chain. Fetch failures
/// are logged and reported to the caller, never propagated.
use crate::etl::transform;
use crate::models::{Block, MarkerCategory, TransactionRecord};
use crate::rpc::ChainClient;
use futures::future::join_all;
use std::ops::RangeInclusive;

/// Contiguous inclusive range of block numbers processed together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub start: u64,
    pub end: u64,
}

impl BlockWindow {
    /// Window of `size + 1` blocks: `[start, start + size]`
    pub fn new(start: u64, size: u64) -> Self {
        Self { start, end: start.saturating_add(size) }
    }

    /// Shrink the window so it does not reach past `tip`
    pub fn clamp_to(self, tip: u64) -> Self {
        Self { start: self.start, end: self.end.min(tip).max(self.start) }
    }

    pub fn blocks(&self) -> RangeInclusive<u64> {
        self.start..=self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Outcome of fetching one window
#[derive(Debug, Default)]
pub struct WindowFetch {
    /// Successfully fetched blocks in ascending block order
    pub blocks: Vec<Block>,
    /// Block numbers whose fetch failed, ascending
    pub failed: Vec<u64>,
    /// Failed blocks whose error will not go away on retry
    pub permanent: Vec<u64>,
}

impl WindowFetch {
    pub fn is_permanent(&self, number: u64) -> bool {
        self.permanent.contains(&number)
    }
}

/// Fetch every block of the window concurrently, one request per block
pub async fn fetch_window<C: ChainClient + ?Sized>(client: &C, window: BlockWindow) -> WindowFetch {
    let requests = window.blocks().map(|number| async move { (number, client.get_block(number, true).await) });

    let mut fetch = WindowFetch::default();

    for (number, result) in join_all(requests).await {
        match result {
            Ok(Some(block)) => fetch.blocks.push(block),
            Ok(None) => {
                tracing::warn!("Block {} not available from RPC", number);
                fetch.failed.push(number);
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!("Transient failure fetching block {}: {}", number, e);
                fetch.failed.push(number);
            }
            Err(e) => {
                tracing::error!("Failed to fetch block {}: {}", number, e);
                fetch.failed.push(number);
                fetch.permanent.push(number);
            }
        }
    }

    fetch
}

/// Fetch a transaction and its enclosing block, then convert it.
///
/// A failed block lookup still yields a record, with a null timestamp.
pub async fn fetch_transaction_detail<C: ChainClient + ?Sized>(client: &C, hash: &str) -> Option<TransactionRecord> {
    let tx = match client.get_transaction(hash).await {
        Ok(Some(tx)) => tx,
        Ok(None) => {
            tracing::warn!("Transaction {} not found on chain", hash);
            return None;
        }
        Err(e) => {
            tracing::warn!("Failed to fetch transaction {}: {}", hash, e);
            return None;
        }
    };

    let Some(block_number) = tx.block_number else {
        tracing::warn!("Transaction {} is still pending, skipping", hash);
        return None;
    };

    let block_timestamp = match client.get_block(block_number, false).await {
        Ok(Some(block)) => Some(block.timestamp),
        Ok(None) => {
            tracing::warn!("Block {} for transaction {} not available", block_number, hash);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to fetch block {} for transaction {}: {}", block_number, hash, e);
            None
        }
    };

    transform::convert_transaction(&tx, block_timestamp)
}

/// Fetch details for every pending hash of one category, one request at a time
pub async fn fetch_category<C: ChainClient + ?Sized>(
    client: &C,
    category: &MarkerCategory,
    hashes: &[String],
) -> Vec<TransactionRecord> {
    tracing::info!("Fetching {} pending transactions for {}", hashes.len(), category.table_name());

    let mut records = Vec::with_capacity(hashes.len());
    for hash in hashes {
        if let Some(record) = fetch_transaction_detail(client, hash).await {
            records.push(record);
        }
    }

    tracing::info!("Fetched {}/{} pending transactions for {}", records.len(), hashes.len(), category.table_name());
    records
}
