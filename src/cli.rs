use clap::{Args, Parser, Subcommand};

use crate::config::{CollectorSettings, FixGapsRequest};
use crate::error::Error;
use crate::schema::Series;
use crate::util;

#[derive(Parser, Debug)]
#[command(version, about = "Collect exchange klines into storage and repair gaps")]
pub struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    pub config: String,

    /// Debug logging (also enabled by `debug.log` in the config)
    #[arg(short = 'v', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save new klines from the exchange live feed to storage
    Collect(CollectArgs),

    /// Find and backfill gaps in stored klines
    FixGaps(FixGapsArgs),
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Symbol to watch
    #[arg(long, default_value = "BTCUSDT")]
    pub symbol: String,

    /// Interval of the symbol to watch (e.g. 1m, 1h, 1d)
    #[arg(long, default_value = "1m")]
    pub interval: String,

    /// Number of finalized klines per store write
    #[arg(long, default_value_t = 50)]
    pub chunk_size: usize,

    /// Drop a trailing partial chunk when the feed ends instead of writing it
    #[arg(long)]
    pub no_flush_on_close: bool,
}

impl CollectArgs {
    /// Validates the arguments against the source page limit; fails before any I/O.
    pub fn settings(
        &self,
        debug: bool,
        max_batch: Option<usize>,
    ) -> Result<CollectorSettings, Error> {
        let series = Series::new(self.symbol.clone(), self.interval.parse()?);

        let mut settings = CollectorSettings::new(series, self.chunk_size);
        settings.debug = debug;
        settings.flush_on_close = !self.no_flush_on_close;
        settings.validate(max_batch)?;
        Ok(settings)
    }
}

#[derive(Args, Debug)]
pub struct FixGapsArgs {
    /// Symbol to fix gaps for
    #[arg(long, default_value = "BTCUSDT")]
    pub symbol: String,

    /// Interval to fix gaps for
    #[arg(long, default_value = "1m")]
    pub interval: String,

    /// Fix gaps from this time, YYYY-MM-DD_HH:MM:SS (UTC)
    #[arg(long, default_value = "2017-08-17_04:00:00")]
    pub from: String,

    /// Fix gaps up to this time, YYYY-MM-DD_HH:MM:SS (UTC); defaults to now
    #[arg(long)]
    pub to: Option<String>,

    /// Page size for store scans and source fetches
    #[arg(long, default_value_t = 100)]
    pub chunk_size: usize,
}

impl FixGapsArgs {
    pub fn request(&self, max_batch: Option<usize>) -> Result<FixGapsRequest, Error> {
        let series = Series::new(self.symbol.clone(), self.interval.parse()?);
        let from = util::parse_time_ms(&self.from)?;
        let to = match &self.to {
            Some(raw) => util::parse_time_ms(raw)?,
            None => util::now_ms(),
        };

        let req = FixGapsRequest {
            series,
            from,
            to,
            chunk_size: self.chunk_size,
        };
        req.validate(max_batch)?;
        Ok(req)
    }
}
