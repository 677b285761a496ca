use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::error::{CoreError, CoreResult};
use crate::core::multiplex::{MultiplexChangeRecord, TableId};
use crate::core::record::Row;
use crate::core::schema::TargetSchema;

/// Writer capabilities for feature detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterCapabilities {
    /// Accepts update-after and delete rows, not only inserts
    pub supports_changelog: bool,
    /// Accepts records routed to the quarantine output
    pub supports_quarantine: bool,
    pub max_batch_size: Option<usize>,
}

/// Result returned from writer operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub rows_written: usize,
    pub bytes_written: u64,
}

/// Resolves a routing key to the current column layout of its table.
pub trait SchemaResolver: Send + Sync {
    /// Returns the schema for `table`, or `CoreError::UnknownRoutingTarget`.
    fn resolve(&self, table: &TableId) -> CoreResult<Arc<TargetSchema>>;
}

impl<R: SchemaResolver + ?Sized> SchemaResolver for Arc<R> {
    fn resolve(&self, table: &TableId) -> CoreResult<Arc<TargetSchema>> {
        (**self).resolve(table)
    }
}

#[async_trait]
pub trait TableWriter: Send {
    /// Returns the name of the writer implementation
    fn name(&self) -> &'static str;

    /// Returns the capabilities of this writer
    fn capabilities(&self) -> WriterCapabilities;

    /// Writes a batch of rows, all projected against `schema`
    async fn write_rows(&mut self, schema: &TargetSchema, rows: Vec<Row>) -> Result<WriteResult>;

    /// Sets aside a record that could not be routed or projected
    async fn quarantine(&mut self, record: &MultiplexChangeRecord, error: &CoreError) -> Result<()>;

    /// Flushes any remaining data and releases the output
    async fn close(&mut self) -> Result<()>;
}
