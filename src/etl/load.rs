/// Load Module
///
/// Stores converted records in chunks. A hash that is already stored is skipped
/// by the store; any other error abandons only the chunk it happened in.
use crate::db::TransactionStore;
use crate::models::TransactionRecord;

/// Maximum rows per insert statement
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Summary of one `write_records` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub attempted: usize,
    pub inserted: u64,
    pub failed_chunks: usize,
    pub failed_rows: usize,
}

impl WriteReport {
    /// Rows skipped because their hash was already stored
    pub fn ignored(&self) -> u64 {
        (self.attempted - self.failed_rows) as u64 - self.inserted
    }
}

/// Write records in chunks of at most `chunk_size` rows
pub async fn write_records<S: TransactionStore + ?Sized>(
    store: &S,
    records: &[TransactionRecord],
    chunk_size: usize,
) -> WriteReport {
    let mut report = WriteReport { attempted: records.len(), ..Default::default() };

    for (index, chunk) in records.chunks(chunk_size.max(1)).enumerate() {
        match store.insert_ignoring_duplicates(chunk).await {
            Ok(inserted) => report.inserted += inserted,
            Err(e) => {
                report.failed_chunks += 1;
                report.failed_rows += chunk.len();
                tracing::error!(
                    "Failed to insert chunk {} ({} rows, blocks {}-{}): {}",
                    index,
                    chunk.len(),
                    chunk.first().map(|r| r.block_number).unwrap_or_default(),
                    chunk.last().map(|r| r.block_number).unwrap_or_default(),
                    e
                );
            }
        }
    }

    if report.attempted > 0 {
        tracing::info!(
            "Stored {} of {} transactions ({} already present, {} failed chunks)",
            report.inserted,
            report.attempted,
            report.ignored(),
            report.failed_chunks
        );
    }

    report
}
