pub mod parser;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::MultiplexChangeRecord;

pub use parser::parse_envelope;

/// Counts reported by [`read_envelopes`] when the input ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub parsed: u64,
    pub malformed: u64,
}

/// Reads newline-delimited change envelopes and forwards them to the
/// pipeline.
///
/// Blank lines are ignored and malformed lines are logged and counted, never
/// fatal. Stops early when the receiving side has gone away.
pub async fn read_envelopes<R>(
    mut reader: R,
    tx: mpsc::Sender<MultiplexChangeRecord>,
) -> Result<ReadSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut summary = ReadSummary::default();
    let mut line_no: u64 = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .context("Failed to read input")?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!("Skipping line {}: not valid UTF-8 ({})", line_no, e);
                summary.malformed += 1;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        match parse_envelope(line) {
            Ok(record) => {
                if tx.send(record).await.is_err() {
                    warn!("Pipeline receiver dropped, stopping source at line {}", line_no);
                    break;
                }
                summary.parsed += 1;
            }
            Err(e) => {
                warn!("Skipping malformed line {}: {}", line_no, e);
                summary.malformed += 1;
            }
        }
    }

    info!(
        "Source finished: {} records, {} malformed lines",
        summary.parsed, summary.malformed
    );
    Ok(summary)
}
