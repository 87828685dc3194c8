/// Pipeline Module
///
/// The three synchronization loops that keep the canonical transaction table
/// current:
/// - `forward`: walks the chain from the persisted checkpoint toward the tip
/// - `backfill`: completes transactions marked pending by other capture paths
/// - `reconcile`: removes duplicate rows block by block
pub mod backfill;
pub mod forward;
pub mod reconcile;

use crate::etl::load::WriteReport;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Statistics for one or more forward cycles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    pub blocks_attempted: u64,
    pub blocks_fetched: u64,
    pub blocks_failed: u64,
    pub records_converted: usize,
    pub records_inserted: u64,
    pub records_ignored: u64,
    pub failed_chunks: usize,
    pub elapsed_time: Duration,
}

impl CycleStats {
    pub fn record_write(&mut self, report: &WriteReport) {
        self.records_inserted += report.inserted;
        self.records_ignored += report.ignored();
        self.failed_chunks += report.failed_chunks;
    }

    pub fn absorb(&mut self, other: &CycleStats) {
        self.blocks_attempted += other.blocks_attempted;
        self.blocks_fetched += other.blocks_fetched;
        self.blocks_failed += other.blocks_failed;
        self.records_converted += other.records_converted;
        self.records_inserted += other.records_inserted;
        self.records_ignored += other.records_ignored;
        self.failed_chunks += other.failed_chunks;
        self.elapsed_time += other.elapsed_time;
    }

    pub fn success_rate(&self) -> f64 {
        if self.blocks_attempted == 0 {
            0.0
        } else {
            (self.blocks_fetched as f64 / self.blocks_attempted as f64) * 100.0
        }
    }

    pub fn blocks_per_second(&self) -> f64 {
        let secs = self.elapsed_time.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.blocks_fetched as f64 / secs
        }
    }
}

/// A collector that a scheduler re-enters at a fixed period
#[async_trait]
pub trait ScheduledJob: Send {
    fn name(&self) -> &'static str;

    /// Run until there is no more work available right now
    async fn run_once(&mut self);
}

/// Run `job` immediately and then once per `period`, forever.
///
/// A run that takes longer than `period` delays the next one instead of
/// stacking ticks.
pub async fn run_on_schedule(job: &mut dyn ScheduledJob, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        tracing::debug!("Triggering {}", job.name());
        job.run_once().await;
    }
}
