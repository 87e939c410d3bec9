// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:    Process configuration (JSON) and per-run settings
// - schema:    Candle, stream event, series and gap types
// - interval:  Interval label validation
// - error:     Error taxonomy shared by collector and gap fixer
// - util:      Shared helpers (time, symbol handling)
// - exchanges: Market data sources (historical + live) and registry
// - storage:   Series stores (Redis, in-memory)
// - collector: Live feed -> chunked store writes
// - gapfixer:  Gap detection and backfill over stored history
// - metrics:   Global runtime counters
//
pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod exchanges;
pub mod gapfixer;
pub mod interval;
pub mod metrics;
pub mod schema;
pub mod storage;
pub mod util;

pub use error::{Error, SourceError, StoreError};
pub use interval::Interval;
pub use schema::{Candle, Gap, Series, StreamEvent};
