/// CLI Module
///
/// Command-line interface configuration using clap.
use crate::db::transactions::MAX_CHUNK_SIZE;
use crate::models::{MarkerCategory, Network};
use crate::pipeline::forward::CheckpointPolicy;
use clap::{Parser, ValueEnum};

/// Which synchronization loops this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Component {
    All,
    Forward,
    Backfill,
    Reconcile,
}

impl Component {
    pub fn includes(self, other: Component) -> bool {
        self == Component::All || self == other
    }
}

/// EVM Transaction Sync
///
/// Continuously ingest chain transactions into PostgreSQL, backfill partially
/// captured ones and remove duplicate rows
#[derive(Parser, Debug)]
#[command(name = "evm-tx-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Network name used for table and checkpoint names (overrides CRYPTO_NETWORK env var)
    #[arg(short = 'n', long, value_name = "NAME")]
    pub network: Option<String>,

    /// RPC endpoint URL (overrides PROVIDER_URL env var)
    #[arg(short = 'r', long, value_name = "URL")]
    pub rpc_url: Option<String>,

    /// Database connection URL (overrides DATABASE_URL env var)
    #[arg(short = 'd', long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Loops to run in this process
    #[arg(short = 'c', long, value_enum, default_value_t = Component::All)]
    pub component: Component,

    /// Blocks past the checkpoint fetched per forward cycle
    #[arg(short = 'w', long, value_name = "BLOCKS", default_value = "50")]
    pub window_size: u64,

    /// Maximum rows per insert statement
    #[arg(short = 'b', long, value_name = "ROWS", default_value = "1000")]
    pub chunk_size: usize,

    /// How the forward checkpoint moves past blocks that failed to fetch
    #[arg(long, value_enum, default_value_t = CheckpointPolicy::Contiguous)]
    pub checkpoint_policy: CheckpointPolicy,

    /// Seconds between forward collector triggers
    #[arg(long, value_name = "SECONDS", default_value = "600")]
    pub interval: u64,

    /// Seconds between backfill runs
    #[arg(long, value_name = "SECONDS", default_value = "600")]
    pub backfill_interval: u64,

    /// Seconds the duplicate reconciler sleeps once caught up
    #[arg(long, value_name = "SECONDS", default_value = "300")]
    pub reconcile_wait: u64,

    /// Cycles a failing block or write may hold the forward checkpoint before it is skipped
    #[arg(long, value_name = "COUNT", default_value = "3")]
    pub max_attempts: u32,

    /// Seconds to wait before retrying a window that made no progress
    #[arg(long, value_name = "SECONDS", default_value = "1")]
    pub retry_delay: u64,

    /// RPC request timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value = "30")]
    pub rpc_timeout: u64,

    /// Maximum database connections
    #[arg(long, value_name = "COUNT", default_value = "5")]
    pub max_connections: u32,

    /// Marker categories to backfill from (account_transaction_<category> tables)
    #[arg(long, value_name = "LIST", value_delimiter = ',', default_value = "log,receipt")]
    pub categories: Vec<String>,
}

impl Cli {
    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(network) = &self.network {
            if Network::parse(network).is_none() {
                anyhow::bail!("Network name '{}' must be a lowercase identifier ([a-z_][a-z0-9_]*)", network);
            }
        }

        if self.window_size == 0 {
            anyhow::bail!("Window size must be greater than 0");
        }

        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!("Chunk size must be between 1 and {}", MAX_CHUNK_SIZE);
        }

        if self.interval == 0 || self.backfill_interval == 0 {
            anyhow::bail!("Trigger intervals must be greater than 0");
        }

        if self.reconcile_wait == 0 {
            anyhow::bail!("Reconcile wait must be greater than 0");
        }

        if self.max_attempts == 0 {
            anyhow::bail!("Max attempts must be greater than 0");
        }

        if self.max_connections == 0 {
            anyhow::bail!("Max connections must be greater than 0");
        }

        if self.categories.is_empty() {
            anyhow::bail!("At least one marker category is required");
        }

        if let Some(bad) = self.categories.iter().find(|c| MarkerCategory::parse(c).is_none()) {
            anyhow::bail!("Marker category '{}' must be a lowercase identifier", bad);
        }

        Ok(())
    }
}
