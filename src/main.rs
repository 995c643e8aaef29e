//! flurry: normalizes sales NDJSON into a star schema.
//!
//! Reads transaction files from local disk or S3, splits every record into
//! dimension rows with stable surrogate keys plus a fact row, and writes the
//! tables as Parquet, NDJSON, or to the console.

use clap::Parser;
use flurry::config::Config;
use flurry::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use flurry::metrics;
use flurry::run_pipeline;
use snafu::prelude::*;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Sales NDJSON to star schema normalizer.
#[derive(Parser, Debug)]
#[command(name = "flurry")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without processing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("flurry starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Source: {} (batch size {})", config.source.path, config.source.batch_size);
        info!("Sink: {} {}", config.sink.format, config.sink.path);
        info!("Keys: {:?}", config.keys);
        match &config.checkpoint {
            Some(checkpoint) => info!("Checkpoint: {}", checkpoint.path),
            None => info!("Checkpoint: disabled"),
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let metrics_shutdown = CancellationToken::new();
    let metrics_server = if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        let server = metrics::init(addr, metrics_shutdown.clone())
            .await
            .context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            server.local_addr()
        );
        Some(server)
    } else {
        None
    };

    let result = run_pipeline(config).await;
    metrics_shutdown.cancel();
    if let Some(server) = metrics_server {
        server.join().await;
    }
    let stats = result?;

    info!("Pipeline completed successfully");
    info!("  Files processed: {}", stats.files_processed);
    info!("  Files skipped: {}", stats.files_skipped);
    info!("  Files failed: {}", stats.files_failed);
    info!("  Records processed: {}", stats.records_processed);
    info!("  Batches committed: {}", stats.batches_committed);
    info!("  Batches failed: {}", stats.batches_failed);
    info!("  Fact rows written: {}", stats.fact_rows_written);
    info!("  Dimension rows created: {}", stats.dimension_rows_created);
    info!("  Checkpoints saved: {}", stats.checkpoints_saved);

    Ok(())
}
