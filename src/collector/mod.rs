/// Collector module
///
/// This module groups all logic responsible for:
/// - Subscribing to one live kline feed
/// - Buffering finalized candles into chunks
/// - Flushing chunks to the series store
/// - Routing feed errors to the configured handler
///
/// The collector sits between:
/// - A market data source (live subscription)
/// - A series store (idempotent batch writes)
///
/// Design notes:
/// - Exchange-specific logic MUST NOT live here
/// - Buffered, finalized candles are never dropped on failure paths;
///   the only configurable loss is a trailing partial chunk when the
///   feed closes and `flush_on_close` is off
pub mod runner;

pub use runner::{CollectSummary, Collector};
