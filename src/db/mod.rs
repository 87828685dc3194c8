/// Database Module
///
/// This module handles all PostgreSQL database operations including:
/// - Connection pool management
/// - Schema migrations and per-network table preparation
/// - Checkpoint counters, canonical transaction rows and enrichment markers
pub mod checkpoint;
pub mod markers;
pub mod transactions;

pub use checkpoint::CheckpointStore;
pub use markers::MarkerStore;
pub use transactions::TransactionStore;

use crate::models::{MarkerCategory, Network};
use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Value out of range for column {column}: {value}")]
    OutOfRange { column: &'static str, value: String },
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    transactions_table: String,
}

impl Database {
    /// Create a new database connection pool for one network
    pub async fn new(database_url: &str, max_connections: u32, network: &Network) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        Ok(Self { pool, transactions_table: network.transactions_table() })
    }

    /// Name of the canonical transaction table
    pub fn transactions_table(&self) -> &str {
        &self.transactions_table
    }

    /// Run database migrations and create the network and marker tables
    pub async fn migrate(&self, categories: &[MarkerCategory]) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.context("Failed to run database migrations")?;

        let table = &self.transactions_table;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                tx_hash TEXT NOT NULL,
                block_number BIGINT NOT NULL,
                timestamp TIMESTAMPTZ,
                address_from TEXT,
                address_to TEXT,
                value TEXT,
                input TEXT,
                CONSTRAINT "{table}_unique_tx_hash" UNIQUE (tx_hash)
            )
            "#
        ))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create table {table}"))?;

        sqlx::query(&format!(r#"CREATE INDEX IF NOT EXISTS "{table}_block_number_idx" ON "{table}" (block_number)"#))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create block number index on {table}"))?;

        // Marker tables belong to the capture paths; create them empty so a fresh
        // database can run the backfill loop without errors.
        for category in categories {
            let marker_table = category.table_name();
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{marker_table}" (
                    transaction_hash TEXT NOT NULL,
                    created_at TIMESTAMPTZ
                )
                "#
            ))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create marker table {marker_table}"))?;
        }

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }

    /// Test the database connection
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.context("Database connection test failed")?;

        Ok(())
    }
}

/// Postgres has no unsigned integers; block numbers and counters live in BIGINT
pub(crate) fn to_bigint(column: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange { column, value: value.to_string() })
}

pub(crate) fn from_bigint(column: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange { column, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bigint_conversions() {
        assert_eq!(to_bigint("value", 151).unwrap(), 151);
        assert!(to_bigint("value", u64::MAX).is_err());
        assert_eq!(from_bigint("value", 0).unwrap(), 0);
        assert!(matches!(from_bigint("value", -1), Err(StoreError::OutOfRange { column: "value", .. })));
    }
}
