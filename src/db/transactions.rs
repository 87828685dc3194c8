/// Canonical transaction table access
///
/// Inserts are idempotent: a row whose `tx_hash` is already stored is skipped by
/// the unique constraint instead of failing the statement.
use super::{from_bigint, to_bigint, Database, StoreError};
use crate::models::{StoredRow, TransactionRecord};
use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

/// Columns bound per inserted row
const INSERT_COLUMNS: usize = 7;

/// Largest chunk one insert statement can carry under the Postgres limit of 65535 bind parameters
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize / INSERT_COLUMNS;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert one chunk of records, ignoring hashes that already exist.
    /// Returns the number of rows actually inserted.
    async fn insert_ignoring_duplicates(&self, records: &[TransactionRecord]) -> Result<u64, StoreError>;

    /// Highest block number stored, `None` for an empty table
    async fn max_block_number(&self) -> Result<Option<u64>, StoreError>;

    /// All rows stored at one block number, in physical order
    async fn rows_at_block(&self, block_number: u64) -> Result<Vec<StoredRow>, StoreError>;

    /// Delete rows at one block number by row identifier, returning how many went
    async fn delete_rows(&self, block_number: u64, row_ids: &[String]) -> Result<u64, StoreError>;
}

#[async_trait]
impl TransactionStore for Database {
    async fn insert_ignoring_duplicates(&self, records: &[TransactionRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let block_numbers =
            records.iter().map(|r| to_bigint("block_number", r.block_number)).collect::<Result<Vec<_>, _>>()?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"INSERT INTO "{}" (tx_hash, block_number, timestamp, address_from, address_to, value, input) "#,
            self.transactions_table
        ));

        builder.push_values(records.iter().zip(block_numbers), |mut row, (record, block_number)| {
            row.push_bind(record.tx_hash.clone())
                .push_bind(block_number)
                .push_bind(record.timestamp)
                .push_bind(record.address_from.clone())
                .push_bind(record.address_to.clone())
                .push_bind(record.value.clone())
                .push_bind(record.input.clone());
        });
        builder.push(" ON CONFLICT (tx_hash) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn max_block_number(&self) -> Result<Option<u64>, StoreError> {
        let max: Option<i64> =
            sqlx::query_scalar(&format!(r#"SELECT MAX(block_number) FROM "{}""#, self.transactions_table))
                .fetch_one(&self.pool)
                .await?;

        max.map(|value| from_bigint("block_number", value)).transpose()
    }

    async fn rows_at_block(&self, block_number: u64) -> Result<Vec<StoredRow>, StoreError> {
        let rows = sqlx::query_as::<_, StoredRow>(&format!(
            r#"SELECT ctid::text AS row_id, tx_hash FROM "{}" WHERE block_number = $1 ORDER BY ctid"#,
            self.transactions_table
        ))
        .bind(to_bigint("block_number", block_number)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete_rows(&self, block_number: u64, row_ids: &[String]) -> Result<u64, StoreError> {
        if row_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&format!(
            r#"DELETE FROM "{}" WHERE block_number = $1 AND ctid::text = ANY($2)"#,
            self.transactions_table
        ))
        .bind(to_bigint("block_number", block_number)?)
        .bind(row_ids.to_vec())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
