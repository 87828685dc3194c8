/// Checkpoint Store
///
/// Durable named integer cursors kept in the `counters` table.
use super::{from_bigint, to_bigint, Database, StoreError};
use async_trait::async_trait;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read a checkpoint, creating it with value 0 on first use
    async fn load(&self, name: &str) -> Result<u64, StoreError>;

    /// Persist a checkpoint; a stored value is never lowered
    async fn save(&self, name: &str, value: u64) -> Result<(), StoreError>;
}

#[async_trait]
impl CheckpointStore for Database {
    async fn load(&self, name: &str) -> Result<u64, StoreError> {
        sqlx::query("INSERT INTO counters (name, value) VALUES ($1, 0) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;

        let value: i64 =
            sqlx::query_scalar("SELECT value FROM counters WHERE name = $1").bind(name).fetch_one(&self.pool).await?;

        from_bigint("counters.value", value)
    }

    async fn save(&self, name: &str, value: u64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO counters (name, value)
            VALUES ($1, $2)
            ON CONFLICT (name)
            DO UPDATE SET value = GREATEST(counters.value, EXCLUDED.value)
            "#,
        )
        .bind(name)
        .bind(to_bigint("counters.value", value)?)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Checkpoint {} saved at {}", name, value);
        Ok(())
    }
}
