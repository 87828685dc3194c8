/// Data Models Module
///
/// This module defines the core data structures used throughout the application.
/// These models represent EVM chain data (blocks, transactions) as returned by the
/// JSON-RPC node, and the canonical rows stored in PostgreSQL.
use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Canonical ingested transaction, one row of `transactions_<network>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub block_number: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub address_from: Option<String>,
    pub address_to: Option<String>,
    /// Decimal string in wei
    pub value: Option<String>,
    /// First 4 bytes of call data as hex, without the `0x` prefix
    pub input: Option<String>,
}

/// A block as returned by `eth_getBlockByNumber`
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    #[serde(deserialize_with = "quantity")]
    pub number: u64,
    #[serde(deserialize_with = "quantity")]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: BlockTransactions,
}

impl Block {
    /// Full transaction objects, empty when the block was fetched with hashes only
    pub fn transactions(&self) -> &[ChainTransaction] {
        match &self.transactions {
            BlockTransactions::Full(txs) => txs,
            BlockTransactions::Hashes(_) => &[],
        }
    }
}

/// `transactions` field of a block: full objects or hashes depending on the request flag
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BlockTransactions {
    Full(Vec<ChainTransaction>),
    Hashes(Vec<String>),
}

impl Default for BlockTransactions {
    fn default() -> Self {
        Self::Full(Vec::new())
    }
}

/// A transaction as returned by `eth_getTransactionByHash` or embedded in a block
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    pub hash: String,
    /// `None` while the transaction is still pending
    #[serde(default, deserialize_with = "optional_quantity")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub from: Option<String>,
    /// `None` for contract creation
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub input: Option<String>,
}

/// A stored row located by its physical row identifier
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredRow {
    pub row_id: String,
    pub tx_hash: String,
}

/// Lowercase SQL identifier naming the chain, used as table and counter suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Network(String);

impl Network {
    pub fn parse(name: &str) -> Option<Self> {
        is_identifier(name).then(|| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical transaction table for this network
    pub fn transactions_table(&self) -> String {
        format!("transactions_{}", self.0)
    }

    /// Checkpoint name of the forward collector
    pub fn forward_checkpoint(&self) -> String {
        format!("transactions_{}", self.0)
    }

    /// Checkpoint name of the duplicate reconciler
    pub fn reconcile_checkpoint(&self) -> String {
        format!("transactions_duplicates_{}", self.0)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upstream capture path that records pending-enrichment markers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerCategory(String);

impl MarkerCategory {
    pub fn parse(name: &str) -> Option<Self> {
        is_identifier(name).then(|| Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn table_name(&self) -> String {
        format!("account_transaction_{}", self.0)
    }
}

impl fmt::Display for MarkerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accepts `[a-z_][a-z0-9_]*`, which is safe to splice into table names
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 48 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Parse a JSON-RPC hex quantity such as `0x1b4`
pub fn parse_quantity(raw: &str) -> Option<u64> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_quantity(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid hex quantity: {raw}")))
}

fn optional_quantity<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_quantity(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex quantity: {raw}"))),
        None => Ok(None),
    }
}
