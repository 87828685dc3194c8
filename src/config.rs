/// Config Module
///
/// Resolves CLI flags and environment variables into the runtime configuration.
/// A flag always wins over its environment variable.
use crate::cli::{Cli, Component};
use crate::models::{MarkerCategory, Network};
use crate::pipeline::backfill::BackfillConfig;
use crate::pipeline::forward::ForwardConfig;
use crate::pipeline::reconcile::ReconcileConfig;
use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub network: Network,
    pub rpc_url: String,
    pub database_url: String,
    pub component: Component,
    pub forward: ForwardConfig,
    pub forward_interval: Duration,
    pub backfill: BackfillConfig,
    pub backfill_interval: Duration,
    pub reconcile: ReconcileConfig,
    pub rpc_timeout: Duration,
    pub max_connections: u32,
}

impl SyncConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    fn resolve(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let network_name = cli
            .network
            .clone()
            .or_else(|| env("CRYPTO_NETWORK"))
            .context("CRYPTO_NETWORK not found in environment. Pass --network or check your .env file")?;
        let network = Network::parse(&network_name)
            .with_context(|| format!("Network name '{network_name}' must be a lowercase identifier"))?;

        let rpc_url = cli
            .rpc_url
            .clone()
            .or_else(|| env("PROVIDER_URL"))
            .context("PROVIDER_URL not found in environment. Pass --rpc-url or check your .env file")?;

        let database_url = cli
            .database_url
            .clone()
            .or_else(|| env("DATABASE_URL"))
            .context("DATABASE_URL not found in environment. Pass --database-url or check your .env file")?;

        let categories = cli
            .categories
            .iter()
            .map(|c| MarkerCategory::parse(c).with_context(|| format!("Invalid marker category '{c}'")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            network,
            rpc_url,
            database_url,
            component: cli.component,
            forward: ForwardConfig {
                window_size: cli.window_size,
                chunk_size: cli.chunk_size,
                retry_delay: Duration::from_secs(cli.retry_delay),
                policy: cli.checkpoint_policy,
                max_attempts: cli.max_attempts,
                ..ForwardConfig::default()
            },
            forward_interval: Duration::from_secs(cli.interval),
            backfill: BackfillConfig { categories, chunk_size: cli.chunk_size },
            backfill_interval: Duration::from_secs(cli.backfill_interval),
            reconcile: ReconcileConfig { idle_wait: Duration::from_secs(cli.reconcile_wait) },
            rpc_timeout: Duration::from_secs(cli.rpc_timeout),
            max_connections: cli.max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_resolve_from_env() {
        let cli = Cli::parse_from(["evm-tx-sync"]);
        let config = SyncConfig::resolve(
            &cli,
            env(&[
                ("CRYPTO_NETWORK", "bsc"),
                ("PROVIDER_URL", "https://bsc.example"),
                ("DATABASE_URL", "postgres://localhost/sync"),
            ]),
        )
        .unwrap();

        assert_eq!(config.network.as_str(), "bsc");
        assert_eq!(config.rpc_url, "https://bsc.example");
        assert_eq!(config.forward.window_size, 50);
        assert_eq!(config.forward.max_attempts, 3);
        assert_eq!(config.forward_interval, Duration::from_secs(600));
        assert_eq!(config.reconcile.idle_wait, Duration::from_secs(300));
        assert_eq!(config.backfill.categories.len(), 2);
    }

    #[test]
    fn test_flags_override_env() {
        let cli = Cli::parse_from(["evm-tx-sync", "--network", "polygon", "--rpc-url", "https://polygon.example"]);
        let config = SyncConfig::resolve(
            &cli,
            env(&[
                ("CRYPTO_NETWORK", "bsc"),
                ("PROVIDER_URL", "https://bsc.example"),
                ("DATABASE_URL", "postgres://localhost/sync"),
            ]),
        )
        .unwrap();

        assert_eq!(config.network.as_str(), "polygon");
        assert_eq!(config.rpc_url, "https://polygon.example");
    }

    #[test]
    fn test_missing_database_url() {
        let cli = Cli::parse_from(["evm-tx-sync", "--network", "bsc", "--rpc-url", "https://bsc.example"]);
        let err = SyncConfig::resolve(&cli, env(&[])).unwrap_err();

        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
