pub mod dispatch;
pub mod schema_cache;
pub mod stats;

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::{CoreError, MultiplexChangeRecord, Row, TableId, TableWriter, TargetSchema};
use crate::pipeline::dispatch::{Dispatched, Dispatcher, ErrorPolicy, WriteMode};
use crate::pipeline::stats::{PipelineStats, StatsSnapshot};

/// Rows waiting to be written to one table, all projected against `schema`
struct TableBuffer {
    schema: Arc<TargetSchema>,
    rows: Vec<Row>,
}

/// Fans a multiplexed record stream out into per-table row batches.
pub struct Pipeline {
    rx: mpsc::Receiver<MultiplexChangeRecord>,
    dispatcher: Dispatcher,
    writer: Box<dyn TableWriter>,
    error_policy: ErrorPolicy,
    batch_size: usize,
    batch_timeout: Duration,
    buffers: BTreeMap<TableId, TableBuffer>,
    buffered_rows: usize,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(
        rx: mpsc::Receiver<MultiplexChangeRecord>,
        dispatcher: Dispatcher,
        writer: Box<dyn TableWriter>,
        batch_size: usize,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            rx,
            dispatcher,
            writer,
            error_policy: ErrorPolicy::Quarantine,
            batch_size: batch_size.max(1),
            batch_timeout: batch_timeout.max(Duration::from_millis(1)),
            buffers: BTreeMap::new(),
            buffered_rows: 0,
            stats: PipelineStats::new(),
        }
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    /// Share counters with an outside observer
    pub fn with_stats(mut self, stats: Arc<PipelineStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until the sender side of the channel is dropped, then flushes and
    /// closes the writer. Stops early on a writer failure or, under
    /// `ErrorPolicy::FailFast`, on the first record-scoped error.
    pub async fn run(mut self) -> Result<StatsSnapshot> {
        self.check_writer()?;

        // first tick one period out, not immediately
        let start = tokio::time::Instant::now() + self.batch_timeout;
        let mut interval = tokio::time::interval_at(start, self.batch_timeout);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                record = self.rx.recv() => {
                    match record {
                        Some(record) => {
                            if let Err(e) = self.handle(record).await {
                                break Err(e);
                            }
                        }
                        None => {
                            info!("Pipeline channel closed, initiating graceful shutdown");
                            break Ok(());
                        }
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.flush_all().await {
                        break Err(e);
                    }
                }
            }
        };

        if let Err(e) = outcome {
            error!("CRITICAL: Pipeline stopped: {}", e);
            if self.buffered_rows > 0 {
                warn!("Pipeline stopped with {} pending rows", self.buffered_rows);
            }
            if let Err(close_err) = self.writer.close().await {
                error!("Failed to close writer {}: {}", self.writer.name(), close_err);
            }
            return Err(e);
        }

        self.flush_all().await?;
        self.writer.close().await?;

        let snapshot = self.stats.snapshot();
        info!(
            "Pipeline shutdown complete: {} records, {} rows in {} batches, {} absent, {} quarantined, {} skipped",
            snapshot.records_received,
            snapshot.rows_emitted,
            snapshot.batches_flushed,
            snapshot.absent,
            snapshot.quarantined,
            snapshot.skipped
        );
        Ok(snapshot)
    }

    /// Rejects writer/option combinations that cannot work.
    fn check_writer(&mut self) -> Result<()> {
        let caps = self.writer.capabilities();
        if self.dispatcher.options().write_mode == WriteMode::Changelog && !caps.supports_changelog {
            bail!(
                "Writer {} does not accept changelog rows; use WRITE_MODE=append",
                self.writer.name()
            );
        }
        if self.error_policy == ErrorPolicy::Quarantine && !caps.supports_quarantine {
            warn!(
                "Writer {} has no quarantine output, failed records will be skipped",
                self.writer.name()
            );
            self.error_policy = ErrorPolicy::Skip;
        }
        if let Some(max) = caps.max_batch_size {
            self.batch_size = self.batch_size.min(max.max(1));
        }
        Ok(())
    }

    async fn handle(&mut self, record: MultiplexChangeRecord) -> Result<()> {
        self.stats.increment_received();

        match self.dispatcher.dispatch(&record) {
            Ok(Dispatched::Row { schema, row }) => self.buffer(record.table_id(), schema, row).await,
            Ok(Dispatched::Absent(reason)) => {
                self.stats.increment_absent();
                debug!("No row for {}: {}", record, reason);
                Ok(())
            }
            Err(e) if e.is_record_scoped() => self.reject(&record, e).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn reject(&mut self, record: &MultiplexChangeRecord, err: CoreError) -> Result<()> {
        match self.error_policy {
            ErrorPolicy::Quarantine => {
                warn!("Quarantining {}: {}", record, err);
                self.writer.quarantine(record, &err).await?;
                self.stats.increment_quarantined();
                Ok(())
            }
            ErrorPolicy::Skip => {
                warn!("Skipping {}: {}", record, err);
                self.stats.increment_skipped();
                Ok(())
            }
            ErrorPolicy::FailFast => {
                error!("Failing on {}: {}", record, err);
                // rows that arrived before the bad record are still written
                self.flush_all().await?;
                Err(err.into())
            }
        }
    }

    async fn buffer(&mut self, table: TableId, schema: Arc<TargetSchema>, row: Row) -> Result<()> {
        let schema_changed = self
            .buffers
            .get(&table)
            .is_some_and(|b| !Arc::ptr_eq(&b.schema, &schema));
        if schema_changed {
            self.flush_table(&table).await?;
        }

        self.buffers
            .entry(table)
            .or_insert_with(|| TableBuffer {
                schema,
                rows: Vec::new(),
            })
            .rows
            .push(row);
        self.buffered_rows += 1;

        if self.buffered_rows >= self.batch_size {
            self.flush_all().await?;
        }
        Ok(())
    }

    async fn flush_all(&mut self) -> Result<()> {
        let tables: Vec<TableId> = self.buffers.keys().cloned().collect();
        for table in tables {
            self.flush_table(&table).await?;
        }
        Ok(())
    }

    async fn flush_table(&mut self, table: &TableId) -> Result<()> {
        let Some(buffer) = self.buffers.remove(table) else {
            return Ok(());
        };
        if buffer.rows.is_empty() {
            return Ok(());
        }

        let count = buffer.rows.len();
        self.buffered_rows -= count;
        match self.writer.write_rows(&buffer.schema, buffer.rows).await {
            Ok(result) => {
                debug!("Flushed {} rows to {} ({} bytes)", count, table, result.bytes_written);
                self.stats.add_rows_emitted(count as u64);
                self.stats.increment_batches();
                Ok(())
            }
            Err(e) => {
                error!("CRITICAL: Writer {} failed for {}: {}", self.writer.name(), table, e);
                error!("CRITICAL: Batch details: {} rows lost from buffer", count);
                Err(e)
            }
        }
    }
}
