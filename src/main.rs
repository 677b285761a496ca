// Copyright 2025
// Licensed under the Elastic License v2.0

#![warn(clippy::all)]

use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use cdcmux::config::{Config, InputSource};
use cdcmux::pipeline::dispatch::Dispatcher;
use cdcmux::pipeline::schema_cache::SchemaCatalog;
use cdcmux::pipeline::Pipeline;
use cdcmux::sink::JsonLinesWriter;
use cdcmux::source::read_envelopes;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber; stdout carries rows, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenv().ok();

    let config = Config::from_env()?;
    config.print_banner();

    let catalog = SchemaCatalog::from_file(&config.catalog_path, config.routing_case_sensitive)?;
    let dispatcher = Dispatcher::new(Arc::new(catalog), config.dispatch_options());

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &config.input {
        InputSource::Stdin => Box::new(BufReader::new(tokio::io::stdin())),
        InputSource::File(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
    };

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let source = tokio::spawn(read_envelopes(reader, tx));

    let quarantine = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.quarantine_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open quarantine output {}",
                config.quarantine_path.display()
            )
        })?;
    let writer = JsonLinesWriter::new(tokio::io::stdout(), quarantine);
    let pipeline = Pipeline::new(
        rx,
        dispatcher,
        Box::new(writer),
        config.flush_size,
        config.flush_interval(),
    )
    .with_error_policy(config.error_policy);

    // Dropping the receiver on failure stops the source at its next send
    let snapshot = pipeline.run().await?;

    match source.await {
        Ok(Ok(summary)) => info!(
            "Done: {} envelopes read ({} malformed), {} rows written",
            summary.parsed, summary.malformed, snapshot.rows_emitted
        ),
        Ok(Err(e)) => {
            error!("Source failed: {:#}", e);
            return Err(e);
        }
        Err(e) => return Err(e).context("Source task panicked"),
    }

    Ok(())
}
