// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use anyhow::{Context, anyhow};
use clap::Parser;
use log::{info, warn};
use rustls::crypto::{CryptoProvider, ring};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use kline_watcher::{
    Error,
    cli::{Cli, Command},
    collector::Collector,
    config::Config,
    exchanges::get_source,
    gapfixer::fix_gaps,
    metrics::METRICS,
    storage,
};

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Two commands:
// - collect:  follow the live kline feed and persist closed candles
// - fix-gaps: scan stored history and backfill missing ranges
//
// Both run until done, failed, or interrupted (Ctrl-C).
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --------------------------------------------------------
    // rustls >= 0.23 requires an explicit CryptoProvider
    // installation, once, before any TLS connection.
    // --------------------------------------------------------
    CryptoProvider::install_default(ring::default_provider())
        .map_err(|_| anyhow!("failed to install rustls CryptoProvider"))?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("load config {}", cli.config))?;

    let debug = cli.debug || config.debug_log();
    init_logging(debug);

    let source = get_source(&config.source)
        .ok_or_else(|| anyhow!("source '{}' is not supported", config.source.name))?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("keyboard interruption");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Command::Collect(args) => {
            // Validate everything before opening connections
            let settings = args.settings(debug, source.max_batch())?;
            let store = storage::open(&config.store).await?;

            // Periodic, low-noise metrics line
            tokio::spawn(async {
                loop {
                    sleep(Duration::from_secs(10)).await;
                    info!("[METRICS] {}", METRICS.summary());
                }
            });

            info!(
                "starting watcher {} interval={} chunk-size={}",
                settings.series.symbol, settings.series.interval, settings.chunk_size
            );

            let collector = Collector::new(settings);
            match collector.run(source.as_ref(), store.as_ref(), cancel).await {
                Ok(summary) => info!(
                    "collector finished: {} chunks, {} klines written",
                    summary.chunks_written, summary.candles_written
                ),
                Err(Error::Cancelled) => info!("collector stopped"),
                Err(e) => return Err(e.into()),
            }
        }

        Command::FixGaps(args) => {
            let req = args.request(source.max_batch())?;
            let store = storage::open(&config.store).await?;

            match fix_gaps(source.as_ref(), store.as_ref(), &req, &cancel).await {
                Ok(report) => info!(
                    "fix-gaps done: {} gaps, {} klines backfilled in {} batches",
                    report.gaps_found, report.candles_backfilled, report.batches_written
                ),
                Err(Error::Cancelled) => info!("fix-gaps stopped, re-run to continue"),
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

// ------------------------------------------------------------
// Logging
// ------------------------------------------------------------
//
// RUST_LOG always wins; otherwise info, or debug in debug mode.
//
fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}
