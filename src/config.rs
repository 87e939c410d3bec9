use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, SourceError};
use crate::schema::Series;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level process configuration loaded from `config.json`.
//
// It defines:
// - Which market data source to talk to
// - Where candles are persisted
// - Optional debug configuration
//
// Per-run parameters (symbol, interval, chunk size, time window)
// come from the command line, see `CollectorSettings` and
// `FixGapsRequest`.
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Market data source settings
    pub source: SourceConfig,

    /// Series store settings
    pub store: StoreConfig,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

impl Config {
    /// Reads a JSON configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks config semantics before any connection is opened.
    pub fn validate(&self) -> Result<(), Error> {
        if self.source.name.trim().is_empty() {
            return Err(Error::Config("source.name must not be empty".into()));
        }
        if !self.store.is_demo() && self.store.url.trim().is_empty() {
            return Err(Error::Config(
                "store.url is required unless store.demo is set".into(),
            ));
        }
        Ok(())
    }

    pub fn debug_log(&self) -> bool {
        self.debug
            .as_ref()
            .is_some_and(|d| d.log.unwrap_or(false))
    }
}

// ------------------------------------------------------------
// Source configuration
// ------------------------------------------------------------
//
// `name` selects the adapter ("binance", "binanceus").
// URLs default to the adapter's public endpoints.
//
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,

    /// REST base URL override (e.g. "https://api.binance.com")
    pub rest_url: Option<String>,

    /// WebSocket URL override (e.g. "wss://stream.binance.com:9443/ws")
    pub ws_url: Option<String>,
}

// ------------------------------------------------------------
// Store configuration
// ------------------------------------------------------------
//
// Notes:
// - `url` is a Redis connection string and may contain credentials.
// - `demo` keeps everything in memory (local testing, nothing persisted).
//
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: String,

    pub demo: Option<bool>,
}

impl StoreConfig {
    pub fn is_demo(&self) -> bool {
        self.demo.unwrap_or(false)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Enables debug level logging and per-chunk write logs
    pub log: Option<bool>,
}

// ------------------------------------------------------------
// Collector settings
// ------------------------------------------------------------

/// Side effect invoked for every error coming from the live feed.
pub type ErrorHandler = Arc<dyn Fn(&SourceError) + Send + Sync>;

/// Immutable settings for one collector run.
///
/// `symbol`, `interval` (via `series`) and `chunk_size` are required;
/// everything else has an explicit default, see `CollectorSettings::new`.
#[derive(Clone)]
pub struct CollectorSettings {
    pub series: Series,

    /// Number of finalized candles per store write
    pub chunk_size: usize,

    /// Called for each feed error; `None` logs it at error level
    pub error_handler: Option<ErrorHandler>,

    /// Log every flushed chunk
    pub debug: bool,

    /// Flush a partial buffer when the feed ends without cancellation
    pub flush_on_close: bool,
}

impl CollectorSettings {
    /// Settings with defaults: no custom handler, no debug, flush on close.
    pub fn new(series: Series, chunk_size: usize) -> Self {
        Self {
            series,
            chunk_size,
            error_handler: None,
            debug: false,
            flush_on_close: true,
        }
    }

    pub fn validate(&self, max_batch: Option<usize>) -> Result<(), Error> {
        validate_chunk_size(self.chunk_size, max_batch)
    }
}

impl fmt::Debug for CollectorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorSettings")
            .field("series", &self.series)
            .field("chunk_size", &self.chunk_size)
            .field("error_handler", &self.error_handler.is_some())
            .field("debug", &self.debug)
            .field("flush_on_close", &self.flush_on_close)
            .finish()
    }
}

// ------------------------------------------------------------
// Gap fixing request
// ------------------------------------------------------------

/// Parameters of one `fix_gaps` run over `[from, to]` (epoch ms).
#[derive(Debug, Clone)]
pub struct FixGapsRequest {
    pub series: Series,
    pub from: i64,
    pub to: i64,
    pub chunk_size: usize,
}

impl FixGapsRequest {
    pub fn validate(&self, max_batch: Option<usize>) -> Result<(), Error> {
        if self.from > self.to {
            return Err(Error::Config(format!(
                "from ({}) is after to ({})",
                self.from, self.to
            )));
        }
        validate_chunk_size(self.chunk_size, max_batch)
    }
}

fn validate_chunk_size(chunk_size: usize, max_batch: Option<usize>) -> Result<(), Error> {
    if chunk_size == 0 {
        return Err(Error::Config("chunk size must be positive".into()));
    }
    if let Some(max) = max_batch {
        if chunk_size > max {
            return Err(Error::Config(format!(
                "chunk size {chunk_size} exceeds source page limit {max}"
            )));
        }
    }
    Ok(())
}
