/// Transform Module
///
/// Converts raw chain transactions and their enclosing block into canonical
/// `TransactionRecord` rows. Everything here is pure.
use crate::models::{Block, ChainTransaction, TransactionRecord};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Convert a single transaction.
///
/// `block_timestamp` is the unix timestamp of the enclosing block, `None` when the
/// block lookup failed. Returns `None` for a transaction that is not in a block yet.
pub fn convert_transaction(tx: &ChainTransaction, block_timestamp: Option<u64>) -> Option<TransactionRecord> {
    let block_number = tx.block_number?;

    Some(TransactionRecord {
        tx_hash: tx.hash.clone(),
        block_number,
        timestamp: block_timestamp.and_then(block_time),
        address_from: normalize_address(tx.from.as_deref()),
        address_to: normalize_address(tx.to.as_deref()),
        value: tx.value.map(|v| v.to_string()),
        input: input_selector(tx.input.as_deref()),
    })
}

/// Convert every transaction embedded in a block.
///
/// A hash seen twice in the same block is kept once (first occurrence wins);
/// source order is preserved otherwise.
pub fn convert_block(block: &Block) -> Vec<TransactionRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(block.transactions().len());

    for tx in block.transactions() {
        if !seen.insert(tx.hash.as_str()) {
            tracing::debug!("Skipping repeated transaction {} in block {}", tx.hash, block.number);
            continue;
        }

        let with_block = ChainTransaction { block_number: tx.block_number.or(Some(block.number)), ..tx.clone() };
        if let Some(record) = convert_transaction(&with_block, Some(block.timestamp)) {
            records.push(record);
        }
    }

    records
}

/// Function selector of the call data: characters 2..10 of the hex string when
/// it is longer than 8 characters, otherwise `None`
pub fn input_selector(input: Option<&str>) -> Option<String> {
    let input = input?;
    if input.len() <= 8 {
        return None;
    }

    let end = input.len().min(10);
    input.get(2..end).map(str::to_string)
}

fn normalize_address(address: Option<&str>) -> Option<String> {
    address.filter(|a| !a.is_empty()).map(str::to_lowercase)
}

fn block_time(timestamp: u64) -> Option<DateTime<Utc>> {
    i64::try_from(timestamp).ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
}
