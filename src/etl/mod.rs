/// ETL Module
///
/// Shared building blocks of the collectors:
/// - Extract: fetch blocks and transaction details from the chain RPC
/// - Transform: convert chain transactions into canonical records
/// - Load: idempotent chunked writes into the canonical table
pub mod extract;
pub mod load;
pub mod transform;
