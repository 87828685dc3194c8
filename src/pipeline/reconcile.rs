/// Duplicate Reconciler
///
/// Walks already-ingested block numbers one at a time behind its own
/// checkpoint, keeps the first row of every transaction hash in the block and
/// deletes the rest. The position never moves past the highest stored block, so
/// at the head of the table it sleeps until the forward collector writes more.
use crate::db::{CheckpointStore, TransactionStore};
use crate::models::StoredRow;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the duplicate reconciler
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Sleep between checks once the reconciler has caught up
    pub idle_wait: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { idle_wait: Duration::from_secs(300) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    /// The block at this position was checked
    Scanned { block: u64, removed: u64 },
    /// The already-checked position was moved forward because more blocks are stored
    Resumed { scan_pos: u64 },
    /// Nothing new to check
    Waiting,
}

/// Totals of one `drain` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub blocks_scanned: u64,
    pub rows_removed: u64,
}

pub struct DuplicateReconciler<S> {
    store: Arc<S>,
    checkpoint_name: String,
    config: ReconcileConfig,
    scan_pos: u64,
    max_block: u64,
    last_scanned: Option<u64>,
}

impl<S> DuplicateReconciler<S>
where
    S: TransactionStore + CheckpointStore,
{
    pub fn new(store: Arc<S>, checkpoint_name: String, config: ReconcileConfig) -> Self {
        Self { store, checkpoint_name, config, scan_pos: 0, max_block: 0, last_scanned: None }
    }

    /// Run forever, sleeping whenever there is nothing left to check
    pub async fn run(&mut self) {
        loop {
            let summary = self.drain().await;
            if summary.blocks_scanned > 0 {
                tracing::info!(
                    "Duplicate scan reached block {}: {} blocks checked, {} duplicate rows removed",
                    self.scan_pos,
                    summary.blocks_scanned,
                    summary.rows_removed
                );
            }
            tokio::time::sleep(self.config.idle_wait).await;
        }
    }

    /// Step until the reconciler is waiting
    pub async fn drain(&mut self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        loop {
            match self.step().await {
                ReconcileStep::Scanned { removed, .. } => {
                    summary.blocks_scanned += 1;
                    summary.rows_removed += removed;
                }
                ReconcileStep::Resumed { .. } => {}
                ReconcileStep::Waiting => return summary,
            }
        }
    }

    pub async fn step(&mut self) -> ReconcileStep {
        let scan_pos = self.read_scan_pos().await;

        if self.last_scanned == Some(scan_pos) {
            self.refresh_max_block().await;
            if scan_pos < self.max_block && self.advance(scan_pos + 1).await {
                return ReconcileStep::Resumed { scan_pos: scan_pos + 1 };
            }
            return ReconcileStep::Waiting;
        }

        self.refresh_max_block().await;
        let removed = self.reconcile_block(scan_pos).await;
        self.last_scanned = Some(scan_pos);

        if scan_pos < self.max_block {
            self.advance(scan_pos + 1).await;
        }

        ReconcileStep::Scanned { block: scan_pos, removed }
    }

    /// Delete every repeated hash at `block`, returning the number of rows removed
    async fn reconcile_block(&self, block: u64) -> u64 {
        let rows = match self.store.rows_at_block(block).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("Failed to read transactions at block {}: {}", block, e);
                return 0;
            }
        };

        let duplicates = find_duplicates(&rows);
        if duplicates.is_empty() {
            return 0;
        }

        match self.store.delete_rows(block, &duplicates).await {
            Ok(removed) => {
                tracing::info!("Removed {} duplicate transactions at block {}", removed, block);
                removed
            }
            Err(e) => {
                tracing::error!("Failed to delete duplicate transactions {:?} at block {}: {}", duplicates, block, e);
                0
            }
        }
    }

    async fn read_scan_pos(&mut self) -> u64 {
        match self.store.load(&self.checkpoint_name).await {
            Ok(value) => self.scan_pos = value,
            Err(e) => tracing::warn!(
                "Failed to read checkpoint {}, using last known {}: {}",
                self.checkpoint_name,
                self.scan_pos,
                e
            ),
        }
        self.scan_pos
    }

    async fn refresh_max_block(&mut self) {
        match self.store.max_block_number().await {
            Ok(max) => self.max_block = max.unwrap_or(0),
            Err(e) => tracing::warn!("Failed to read max block number, using last known {}: {}", self.max_block, e),
        }
    }

    async fn advance(&mut self, next: u64) -> bool {
        self.scan_pos = next;
        match self.store.save(&self.checkpoint_name, next).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to update checkpoint {} to {}: {}", self.checkpoint_name, next, e);
                false
            }
        }
    }
}

/// Row identifiers of every repeated hash; the first occurrence of each hash is kept
pub fn find_duplicates(rows: &[StoredRow]) -> Vec<String> {
    let mut seen = HashSet::new();

    rows.iter().filter(|row| !seen.insert(row.tx_hash.as_str())).map(|row| row.row_id.clone()).collect()
}
