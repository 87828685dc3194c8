/// PendingEnrichment markers written by the upstream capture paths
use super::{Database, StoreError};
use crate::models::MarkerCategory;
use async_trait::async_trait;

#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Distinct hashes whose enrichment timestamp is still null
    async fn pending_hashes(&self, category: &MarkerCategory) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl MarkerStore for Database {
    async fn pending_hashes(&self, category: &MarkerCategory) -> Result<Vec<String>, StoreError> {
        let hashes = sqlx::query_scalar::<_, String>(&format!(
            r#"SELECT DISTINCT transaction_hash FROM "{}" WHERE created_at IS NULL"#,
            category.table_name()
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(hashes)
    }
}
