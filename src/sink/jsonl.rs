// Copyright 2025
// Licensed under the Elastic License v2.0

//! Newline-delimited JSON table writer
//!
//! Each row becomes one object on the row output:
//!
//! ```text
//! {"database":"db1","table":"users","kind":"+I","row":{"id":1,"name":"Alice"}}
//! ```
//!
//! Quarantined records go to a separate output:
//!
//! ```text
//! {"record":"db1.users INSERT{id=abc}","error":"Coercion error: ..."}
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::core::{
    CoreError, MultiplexChangeRecord, Row, TableWriter, TargetSchema, WriteResult,
    WriterCapabilities,
};

/// Writes rows and quarantined records as JSON lines to two async outputs.
pub struct JsonLinesWriter<W, Q> {
    rows: W,
    quarantine: Q,
}

impl<W, Q> JsonLinesWriter<W, Q>
where
    W: AsyncWrite + Unpin + Send,
    Q: AsyncWrite + Unpin + Send,
{
    pub fn new(rows: W, quarantine: Q) -> Self {
        Self { rows, quarantine }
    }

    pub fn into_inner(self) -> (W, Q) {
        (self.rows, self.quarantine)
    }

    fn encode_row(schema: &TargetSchema, row: &Row) -> Result<Vec<u8>> {
        let line = json!({
            "database": schema.database,
            "table": schema.table,
            "kind": row.kind().short_string(),
            "row": row.to_json(&schema.columns),
        });
        let mut bytes = serde_json::to_vec(&line).context("Failed to encode row")?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[async_trait]
impl<W, Q> TableWriter for JsonLinesWriter<W, Q>
where
    W: AsyncWrite + Unpin + Send,
    Q: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn capabilities(&self) -> WriterCapabilities {
        WriterCapabilities {
            supports_changelog: true,
            supports_quarantine: true,
            max_batch_size: None,
        }
    }

    async fn write_rows(&mut self, schema: &TargetSchema, rows: Vec<Row>) -> Result<WriteResult> {
        let mut buf = Vec::with_capacity(rows.len() * 64);
        for row in &rows {
            buf.extend_from_slice(&Self::encode_row(schema, row)?);
        }

        self.rows
            .write_all(&buf)
            .await
            .with_context(|| format!("Failed to write rows for {}", schema.qualified_name()))?;
        self.rows.flush().await.context("Failed to flush row output")?;

        Ok(WriteResult {
            rows_written: rows.len(),
            bytes_written: buf.len() as u64,
        })
    }

    async fn quarantine(&mut self, record: &MultiplexChangeRecord, error: &CoreError) -> Result<()> {
        let line = json!({
            "record": record.to_string(),
            "error": error.to_string(),
        });
        let mut bytes = serde_json::to_vec(&line).context("Failed to encode quarantined record")?;
        bytes.push(b'\n');

        self.quarantine
            .write_all(&bytes)
            .await
            .context("Failed to write quarantined record")?;
        self.quarantine
            .flush()
            .await
            .context("Failed to flush quarantine output")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.rows.shutdown().await.context("Failed to close row output")?;
        self.quarantine
            .shutdown()
            .await
            .context("Failed to close quarantine output")?;
        Ok(())
    }
}
