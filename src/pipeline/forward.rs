/// Forward Collector
///
/// Walks the chain from the persisted checkpoint toward the current tip, one
/// window of blocks per cycle: fetch every block of the window concurrently,
/// convert and sort the transactions, store them idempotently, then advance the
/// checkpoint.
use super::{CycleStats, ScheduledJob};
use crate::db::{CheckpointStore, TransactionStore};
use crate::etl::extract::{self, BlockWindow, WindowFetch};
use crate::etl::load::{self, DEFAULT_CHUNK_SIZE};
use crate::etl::transform;
use crate::models::TransactionRecord;
use crate::progress::ProgressReporter;
use crate::rpc::ChainClient;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How far the checkpoint moves after a window with failed fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CheckpointPolicy {
    /// Move past the whole window once any block in it was fetched.
    /// Blocks that failed inside the window are never fetched again.
    Window,
    /// Move only past the leading run of fetched blocks and never past the tip.
    /// A failed block or failed write is retried by the next cycle, up to
    /// `max_attempts`; a block failing with a permanent error is skipped at once.
    Contiguous,
}

/// Configuration for the forward collector
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Blocks past the checkpoint fetched per cycle; a window spans `window_size + 1` blocks
    pub window_size: u64,
    pub chunk_size: usize,
    /// Pause before retrying a window that made no progress
    pub retry_delay: Duration,
    pub policy: CheckpointPolicy,
    /// Cycles a failed block or failed write may hold the checkpoint before it is skipped
    pub max_attempts: u32,
    /// Consecutive stalled cycles after which `run` hands back to the scheduler
    pub max_stalled_cycles: u32,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_delay: Duration::from_secs(1),
            policy: CheckpointPolicy::Contiguous,
            max_attempts: 3,
            max_stalled_cycles: 5,
        }
    }
}

/// Result of a single cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Checkpoint has reached the tip; nothing was fetched or written
    Idle,
    /// The checkpoint moved forward
    Advanced { checkpoint: u64, stats: CycleStats },
    /// No forward progress was possible this cycle
    Stalled { stats: CycleStats },
}

pub struct ForwardCollector<C, S> {
    chain: Arc<C>,
    store: Arc<S>,
    progress: Arc<dyn ProgressReporter>,
    config: ForwardConfig,
    checkpoint_name: String,
    // Last values read successfully, used when a read fails
    checkpoint: u64,
    tip: u64,
    // Failed cycles per held block, and per held window for write failures
    block_attempts: HashMap<u64, u32>,
    write_attempts: u32,
}

impl<C, S> ForwardCollector<C, S>
where
    C: ChainClient,
    S: TransactionStore + CheckpointStore,
{
    pub fn new(
        chain: Arc<C>,
        store: Arc<S>,
        progress: Arc<dyn ProgressReporter>,
        checkpoint_name: String,
        config: ForwardConfig,
    ) -> Self {
        Self {
            chain,
            store,
            progress,
            config,
            checkpoint_name,
            checkpoint: 0,
            tip: 0,
            block_attempts: HashMap::new(),
            write_attempts: 0,
        }
    }

    /// Run cycles back to back until the checkpoint reaches the tip, or until
    /// `max_stalled_cycles` cycles in a row made no progress
    pub async fn run(&mut self) -> CycleStats {
        let mut totals = CycleStats::default();
        let mut stalled = 0;

        loop {
            match self.cycle().await {
                CycleOutcome::Idle => break,
                CycleOutcome::Advanced { stats, .. } => {
                    totals.absorb(&stats);
                    stalled = 0;
                }
                CycleOutcome::Stalled { stats } => {
                    totals.absorb(&stats);
                    stalled += 1;
                    if stalled >= self.config.max_stalled_cycles {
                        tracing::warn!(
                            "Forward sync stalled at block {} for {} cycles, waiting for the next trigger",
                            self.checkpoint,
                            stalled
                        );
                        break;
                    }
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }

        if totals.blocks_attempted > 0 {
            tracing::info!(
                "Forward sync at block {}: {} blocks fetched ({:.1}% success, {:.2} blocks/sec), \
                 {} inserted, {} already present",
                self.checkpoint,
                totals.blocks_fetched,
                totals.success_rate(),
                totals.blocks_per_second(),
                totals.records_inserted,
                totals.records_ignored
            );
        }

        totals
    }

    /// Process one window
    pub async fn cycle(&mut self) -> CycleOutcome {
        let started = Instant::now();
        let tip = self.refresh_tip().await;
        let checkpoint = self.refresh_checkpoint().await;

        self.progress.report(checkpoint, tip);

        if checkpoint >= tip {
            tracing::debug!("Checkpoint {} has reached tip {}, idle", checkpoint, tip);
            return CycleOutcome::Idle;
        }

        let window = BlockWindow::new(checkpoint, self.config.window_size);
        let window = match self.config.policy {
            CheckpointPolicy::Window => window,
            CheckpointPolicy::Contiguous => window.clamp_to(tip),
        };

        let fetch = extract::fetch_window(self.chain.as_ref(), window).await;

        let mut stats = CycleStats {
            blocks_attempted: window.len(),
            blocks_fetched: fetch.blocks.len() as u64,
            blocks_failed: fetch.failed.len() as u64,
            ..Default::default()
        };

        if fetch.blocks.is_empty() {
            tracing::error!("Failed to fetch any block in range {}-{}, retrying", window.start, window.end);
            stats.elapsed_time = started.elapsed();
            return CycleOutcome::Stalled { stats };
        }

        let records = window_records(&fetch);
        stats.records_converted = records.len();

        let report = load::write_records(self.store.as_ref(), &records, self.config.chunk_size).await;
        stats.record_write(&report);

        let next = self.next_checkpoint(window, &fetch, report.failed_chunks);
        stats.elapsed_time = started.elapsed();

        if next <= checkpoint {
            tracing::warn!("Checkpoint held at {} for range {}-{}, retrying", checkpoint, window.start, window.end);
            return CycleOutcome::Stalled { stats };
        }

        if let Err(e) = self.store.save(&self.checkpoint_name, next).await {
            tracing::error!("Failed to update checkpoint {} to {}: {}", self.checkpoint_name, next, e);
        }
        self.checkpoint = next;
        self.progress.report(next, tip);

        tracing::debug!(
            "Blocks {}-{}: {} transactions, {} new, checkpoint now {}",
            window.start,
            window.end,
            stats.records_converted,
            stats.records_inserted,
            next
        );

        CycleOutcome::Advanced { checkpoint: next, stats }
    }

    fn next_checkpoint(&mut self, window: BlockWindow, fetch: &WindowFetch, failed_chunks: usize) -> u64 {
        let past_window = window.end + 1;

        if self.config.policy == CheckpointPolicy::Window {
            return past_window;
        }

        if failed_chunks > 0 {
            self.write_attempts += 1;
            if self.write_attempts < self.config.max_attempts {
                return window.start;
            }
            tracing::error!(
                "Writes for blocks {}-{} failed in {} cycles, moving past them",
                window.start,
                window.end,
                self.write_attempts
            );
        }
        self.write_attempts = 0;

        let next = self.first_block_to_retry(fetch).unwrap_or(past_window);
        self.block_attempts.retain(|&number, _| number >= next);
        next
    }

    /// First failed block still worth holding the checkpoint for; the others are skipped
    fn first_block_to_retry(&mut self, fetch: &WindowFetch) -> Option<u64> {
        for &number in &fetch.failed {
            let attempts = self.block_attempts.entry(number).or_insert(0);
            *attempts += 1;

            if fetch.is_permanent(number) || *attempts >= self.config.max_attempts {
                tracing::error!("Skipping block {} after {} failed fetches", number, attempts);
                self.block_attempts.remove(&number);
                continue;
            }

            return Some(number);
        }

        None
    }

    async fn refresh_tip(&mut self) -> u64 {
        match self.chain.current_tip_height().await {
            Ok(tip) => self.tip = tip,
            Err(e) => tracing::warn!("Failed to fetch tip height, using last known {}: {}", self.tip, e),
        }
        self.tip
    }

    async fn refresh_checkpoint(&mut self) -> u64 {
        match self.store.load(&self.checkpoint_name).await {
            Ok(value) => self.checkpoint = value,
            Err(e) => tracing::warn!(
                "Failed to read checkpoint {}, using last known {}: {}",
                self.checkpoint_name,
                self.checkpoint,
                e
            ),
        }
        self.checkpoint
    }
}

/// Converted records of every fetched block, ordered by block number
fn window_records(fetch: &WindowFetch) -> Vec<TransactionRecord> {
    let mut records: Vec<TransactionRecord> = fetch.blocks.iter().flat_map(transform::convert_block).collect();
    records.sort_by_key(|r| r.block_number);
    records
}

#[async_trait]
impl<C, S> ScheduledJob for ForwardCollector<C, S>
where
    C: ChainClient,
    S: TransactionStore + CheckpointStore,
{
    fn name(&self) -> &'static str {
        "forward collector"
    }

    async fn run_once(&mut self) {
        self.run().await;
    }
}
