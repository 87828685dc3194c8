/// In-memory stand-ins for the chain RPC, the database and the progress
/// reporter, shared by the unit tests.
use crate::db::{CheckpointStore, MarkerStore, StoreError, TransactionStore};
use crate::models::{Block, BlockTransactions, ChainTransaction, MarkerCategory, StoredRow, TransactionRecord};
use crate::progress::ProgressReporter;
use crate::rpc::{ChainClient, RpcError};
use alloy_primitives::U256;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn record(hash: &str, block_number: u64) -> TransactionRecord {
    TransactionRecord {
        tx_hash: hash.to_string(),
        block_number,
        timestamp: None,
        address_from: Some("0xfrom".to_string()),
        address_to: Some("0xto".to_string()),
        value: Some("0".to_string()),
        input: None,
    }
}

/// Chain with two transactions per block
pub struct FakeChain {
    blocks: HashMap<u64, Block>,
    transactions: HashMap<String, ChainTransaction>,
    failing: Mutex<HashSet<u64>>,
    broken: HashSet<u64>,
    tip: AtomicU64,
    requested: Mutex<Vec<u64>>,
    transaction_calls: AtomicUsize,
}

impl FakeChain {
    pub const TXS_PER_BLOCK: usize = 2;

    pub fn tx_hash(block: u64, index: usize) -> String {
        format!("0x{block:08x}{index:02x}")
    }

    pub fn timestamp_of(block: u64) -> u64 {
        1_600_000_000 + block * 12
    }

    pub fn with_blocks(range: RangeInclusive<u64>) -> Self {
        let tip = *range.end();
        let mut blocks = HashMap::new();
        let mut transactions = HashMap::new();

        for number in range {
            let txs: Vec<ChainTransaction> = (0..Self::TXS_PER_BLOCK)
                .map(|index| ChainTransaction {
                    hash: Self::tx_hash(number, index),
                    block_number: Some(number),
                    from: Some(format!("0xSENDER{number:x}")),
                    to: Some(format!("0xRecipient{index}")),
                    value: Some(U256::from(number)),
                    input: Some("0xa9059cbb0000".to_string()),
                })
                .collect();

            for tx in &txs {
                transactions.insert(tx.hash.clone(), tx.clone());
            }

            blocks.insert(
                number,
                Block { number, timestamp: Self::timestamp_of(number), transactions: BlockTransactions::Full(txs) },
            );
        }

        Self {
            blocks,
            transactions,
            failing: Mutex::new(HashSet::new()),
            broken: HashSet::new(),
            tip: AtomicU64::new(tip),
            requested: Mutex::new(Vec::new()),
            transaction_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_tip(self, tip: u64) -> Self {
        self.set_tip(tip);
        self
    }

    /// Block whose fetch fails with a rate-limit error until recovered
    pub fn failing_block(self, number: u64) -> Self {
        self.failing.lock().unwrap().insert(number);
        self
    }

    /// Block whose fetch always fails with an error that retrying cannot fix
    pub fn broken_block(mut self, number: u64) -> Self {
        self.broken.insert(number);
        self
    }

    /// A transaction known by hash whose block may not exist
    pub fn with_loose_transaction(mut self, hash: &str, block_number: u64) -> Self {
        let tx = ChainTransaction {
            hash: hash.to_string(),
            block_number: Some(block_number),
            from: None,
            to: None,
            value: None,
            input: None,
        };
        self.transactions.insert(hash.to_string(), tx);
        self
    }

    pub fn recover_block(&self, number: u64) {
        self.failing.lock().unwrap().remove(&number);
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn block_calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn requested_blocks(&self) -> Vec<u64> {
        let mut requested = self.requested.lock().unwrap().clone();
        requested.sort_unstable();
        requested
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn current_tip_height(&self) -> Result<u64, RpcError> {
        Ok(self.tip.load(Ordering::SeqCst))
    }

    async fn get_block(&self, number: u64, include_transactions: bool) -> Result<Option<Block>, RpcError> {
        self.requested.lock().unwrap().push(number);

        if self.broken.contains(&number) {
            return Err(RpcError::Rpc { code: -32000, message: format!("missing trie node for block {number}") });
        }

        if self.failing.lock().unwrap().contains(&number) {
            return Err(RpcError::Rpc { code: -32005, message: "limit exceeded".to_string() });
        }

        Ok(self.blocks.get(&number).map(|block| {
            let mut block = block.clone();
            if !include_transactions {
                let hashes = block.transactions().iter().map(|tx| tx.hash.clone()).collect();
                block.transactions = BlockTransactions::Hashes(hashes);
            }
            block
        }))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<ChainTransaction>, RpcError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.transactions.get(hash).cloned())
    }
}

/// Canonical table, counters and marker tables in memory.
///
/// Inserts honour the unique hash constraint; `with_raw_rows` and
/// `push_raw_row` bypass it to seed duplicates.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<(String, TransactionRecord)>>,
    next_row_id: AtomicU64,
    counters: Mutex<HashMap<String, u64>>,
    markers: HashMap<String, Vec<String>>,
    failing_markers: HashSet<String>,
    failing_hash: Option<String>,
    checkpoints_failing: AtomicBool,
    chunk_sizes: Mutex<Vec<usize>>,
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    pub fn with_checkpoint(self, name: &str, value: u64) -> Self {
        self.counters.lock().unwrap().insert(name.to_string(), value);
        self
    }

    pub fn with_pending(mut self, category: &str, hashes: &[&str]) -> Self {
        self.markers.insert(category.to_string(), hashes.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn failing_markers(mut self, category: &str) -> Self {
        self.failing_markers.insert(category.to_string());
        self
    }

    /// Any chunk containing this hash fails to insert
    pub fn failing_insert_of(mut self, hash: &str) -> Self {
        self.failing_hash = Some(hash.to_string());
        self
    }

    pub fn with_raw_rows(self, rows: &[(&str, u64)]) -> Self {
        for (hash, block) in rows {
            self.push_raw_row(hash, *block);
        }
        self
    }

    pub fn push_raw_row(&self, hash: &str, block_number: u64) {
        let id = self.next_row_id.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().push((format!("(0,{})", id + 1), record(hash, block_number)));
    }

    pub fn set_checkpoints_failing(&self, failing: bool) {
        self.checkpoints_failing.store(failing, Ordering::SeqCst);
    }

    pub fn checkpoint(&self, name: &str) -> Option<u64> {
        self.counters.lock().unwrap().get(name).copied()
    }

    pub fn records(&self) -> Vec<TransactionRecord> {
        self.rows.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn hashes(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.tx_hash).collect()
    }

    pub fn hashes_at(&self, block_number: u64) -> Vec<String> {
        self.records().into_iter().filter(|r| r.block_number == block_number).map(|r| r.tx_hash).collect()
    }

    pub fn block_numbers(&self) -> Vec<u64> {
        self.records().into_iter().map(|r| r.block_number).collect()
    }

    pub fn insert_chunk_sizes(&self) -> Vec<usize> {
        self.chunk_sizes.lock().unwrap().clone()
    }

    fn check_checkpoints(&self) -> Result<(), StoreError> {
        if self.checkpoints_failing.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_ignoring_duplicates(&self, records: &[TransactionRecord]) -> Result<u64, StoreError> {
        self.chunk_sizes.lock().unwrap().push(records.len());

        if let Some(failing) = &self.failing_hash {
            if records.iter().any(|r| &r.tx_hash == failing) {
                return Err(unavailable());
            }
        }

        let mut rows = self.rows.lock().unwrap();
        let mut inserted = 0;
        for record in records {
            if rows.iter().any(|(_, existing)| existing.tx_hash == record.tx_hash) {
                continue;
            }
            let id = self.next_row_id.fetch_add(1, Ordering::SeqCst);
            rows.push((format!("(0,{})", id + 1), record.clone()));
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn max_block_number(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.rows.lock().unwrap().iter().map(|(_, r)| r.block_number).max())
    }

    async fn rows_at_block(&self, block_number: u64) -> Result<Vec<StoredRow>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.block_number == block_number)
            .map(|(row_id, r)| StoredRow { row_id: row_id.clone(), tx_hash: r.tx_hash.clone() })
            .collect())
    }

    async fn delete_rows(&self, block_number: u64, row_ids: &[String]) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(row_id, r)| !(r.block_number == block_number && row_ids.contains(row_id)));
        Ok((before - rows.len()) as u64)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self, name: &str) -> Result<u64, StoreError> {
        self.check_checkpoints()?;
        Ok(*self.counters.lock().unwrap().entry(name.to_string()).or_insert(0))
    }

    async fn save(&self, name: &str, value: u64) -> Result<(), StoreError> {
        self.check_checkpoints()?;
        let mut counters = self.counters.lock().unwrap();
        let current = counters.entry(name.to_string()).or_insert(0);
        *current = (*current).max(value);
        Ok(())
    }
}

#[async_trait]
impl MarkerStore for MemoryStore {
    async fn pending_hashes(&self, category: &MarkerCategory) -> Result<Vec<String>, StoreError> {
        if self.failing_markers.contains(category.as_str()) {
            return Err(unavailable());
        }
        Ok(self.markers.get(category.as_str()).cloned().unwrap_or_default())
    }
}

/// Remembers every progress update
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<(u64, u64)>>,
}

impl RecordingProgress {
    pub fn updates(&self) -> Vec<(u64, u64)> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, current: u64, total: u64) {
        self.updates.lock().unwrap().push((current, total));
    }
}
