use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pipeline counters, updated by the pipeline task and readable from any thread
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub records_received: AtomicU64,
    pub rows_emitted: AtomicU64,
    pub absent: AtomicU64,
    pub quarantined: AtomicU64,
    pub skipped: AtomicU64,
    pub batches_flushed: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub records_received: u64,
    pub rows_emitted: u64,
    pub absent: u64,
    pub quarantined: u64,
    pub skipped: u64,
    pub batches_flushed: u64,
}

impl PipelineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn increment_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rows_emitted(&self, rows: u64) {
        self.rows_emitted.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn increment_absent(&self) {
        self.absent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_quarantined(&self) {
        self.quarantined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            absent: self.absent.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
        }
    }
}
