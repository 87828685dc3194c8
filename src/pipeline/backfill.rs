/// Backfill Collector
///
/// Completes transactions that other capture paths recorded before full detail
/// was available. Markers are read per category, details are fetched one hash
/// at a time within a category (categories run side by side), and everything is
/// stored through the same idempotent write as the forward collector.
use super::ScheduledJob;
use crate::db::{MarkerStore, TransactionStore};
use crate::etl::extract;
use crate::etl::load::{self, WriteReport, DEFAULT_CHUNK_SIZE};
use crate::models::{MarkerCategory, TransactionRecord};
use crate::rpc::ChainClient;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// Configuration for the backfill collector
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub categories: Vec<MarkerCategory>,
    pub chunk_size: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            categories: ["log", "receipt"].into_iter().filter_map(MarkerCategory::parse).collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Summary of one backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub pending: usize,
    pub converted: usize,
    pub write: WriteReport,
}

pub struct BackfillCollector<C, S> {
    chain: Arc<C>,
    store: Arc<S>,
    config: BackfillConfig,
}

impl<C, S> BackfillCollector<C, S>
where
    C: ChainClient,
    S: TransactionStore + MarkerStore,
{
    pub fn new(chain: Arc<C>, store: Arc<S>, config: BackfillConfig) -> Self {
        Self { chain, store, config }
    }

    pub async fn run(&self) -> BackfillReport {
        let pending = self.pending_markers().await;
        let total: usize = pending.iter().map(|(_, hashes)| hashes.len()).sum();

        if total == 0 {
            tracing::debug!("No pending transactions to backfill");
            return BackfillReport::default();
        }

        tracing::info!("Start collecting {} missing transactions", total);

        let chain = self.chain.as_ref();
        let fetches = pending
            .iter()
            .filter(|(_, hashes)| !hashes.is_empty())
            .map(|(category, hashes)| extract::fetch_category(chain, category, hashes));

        let records: Vec<TransactionRecord> = join_all(fetches).await.into_iter().flatten().collect();

        let write = load::write_records(self.store.as_ref(), &records, self.config.chunk_size).await;

        tracing::info!("End of collecting missing transactions: {}/{} converted", records.len(), total);

        BackfillReport { pending: total, converted: records.len(), write }
    }

    /// Pending hashes of every category, read concurrently; a failed read counts as empty
    async fn pending_markers(&self) -> Vec<(&MarkerCategory, Vec<String>)> {
        let store = self.store.as_ref();
        let reads = self.config.categories.iter().map(|category| async move {
            match store.pending_hashes(category).await {
                Ok(hashes) => (category, hashes),
                Err(e) => {
                    tracing::error!("Failed to read pending transactions from {}: {}", category.table_name(), e);
                    (category, Vec::new())
                }
            }
        });

        join_all(reads).await
    }
}

#[async_trait]
impl<C, S> ScheduledJob for BackfillCollector<C, S>
where
    C: ChainClient,
    S: TransactionStore + MarkerStore,
{
    fn name(&self) -> &'static str {
        "backfill collector"
    }

    async fn run_once(&mut self) {
        self.run().await;
    }
}
