/// EVM Transaction Sync
///
/// Keeps a per-network PostgreSQL transaction table in step with an EVM chain:
/// a forward collector follows the tip, a backfill collector completes
/// transactions recorded elsewhere and a reconciler removes duplicate rows.
mod cli;
mod config;
mod db;
mod etl;
mod models;
mod pipeline;
mod progress;
mod rpc;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Component};
use config::SyncConfig;
use db::Database;
use pipeline::backfill::BackfillCollector;
use pipeline::forward::ForwardCollector;
use pipeline::reconcile::DuplicateReconciler;
use progress::{format_number, LogProgress};
use rpc::{ChainClient, EvmRpcClient};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    cli.validate().context("Invalid command-line arguments")?;
    let config = SyncConfig::from_cli(&cli)?;

    println!("🚀 Starting EVM transaction sync for {}...", config.network);

    let chain = EvmRpcClient::new(config.rpc_url.clone(), config.rpc_timeout).context("Failed to create RPC client")?;
    let tip = chain.current_tip_height().await.context("Failed to connect to RPC endpoint")?;

    println!("✅ Connected to: {}", display_host(chain.endpoint()));
    println!("🎯 Current block: {}", format_number(tip));

    println!("\n💾 Connecting to PostgreSQL database...");
    let database = Database::new(&config.database_url, config.max_connections, &config.network)
        .await
        .context("Failed to connect to PostgreSQL database")?;
    database.test_connection().await?;
    println!("✅ Database connected successfully!");

    println!("📋 Running database migrations...");
    database.migrate(&config.backfill.categories).await?;
    println!("✅ Table {} is ready", database.transactions_table());

    tracing::info!("EVM transaction sync initialized, running {:?}", config.component);

    let chain = Arc::new(chain);
    let store = Arc::new(database);

    let forward = async {
        if config.component.includes(Component::Forward) {
            let mut collector = ForwardCollector::new(
                chain.clone(),
                store.clone(),
                Arc::new(LogProgress::new(format!("{} forward sync", config.network))),
                config.network.forward_checkpoint(),
                config.forward.clone(),
            );
            pipeline::run_on_schedule(&mut collector, config.forward_interval).await;
        }
    };

    let backfill = async {
        if config.component.includes(Component::Backfill) {
            let mut collector = BackfillCollector::new(chain.clone(), store.clone(), config.backfill.clone());
            pipeline::run_on_schedule(&mut collector, config.backfill_interval).await;
        }
    };

    let reconcile = async {
        if config.component.includes(Component::Reconcile) {
            let checkpoint_name = config.network.reconcile_checkpoint();
            let mut reconciler = DuplicateReconciler::new(store.clone(), checkpoint_name, config.reconcile.clone());
            reconciler.run().await;
        }
    };

    tokio::join!(forward, backfill, reconcile);

    Ok(())
}

/// Endpoint host only; provider URLs often embed an API key in the path
fn display_host(endpoint: &str) -> String {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => url.host_str().unwrap_or("unknown host").to_string(),
        Err(_) => "unknown host".to_string(),
    }
}
