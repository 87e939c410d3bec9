//! Market data source registry and factory
//!
//! This module provides:
//! - The `MarketDataSource` trait and the `Subscription` type
//! - A factory function to resolve sources by name
//!
//! All exchange-specific logic must live in dedicated adapter modules.
//! The collector and the gap fixer interact exclusively through
//! the `MarketDataSource` trait.

pub mod adapter;
pub mod binance;

use std::sync::Arc;

pub use adapter::{MarketDataSource, ParseResult, Subscription};

use crate::config::SourceConfig;

/// Returns a market data source by name.
///
/// CONTRACT:
/// - `cfg.name` must match a supported exchange ("binance", "binanceus")
/// - URL overrides in `cfg` replace the exchange defaults
///
/// RETURNS:
/// - `None` if the exchange is unknown
///
pub fn get_source(cfg: &SourceConfig) -> Option<Arc<dyn MarketDataSource>> {
    let source = match cfg.name.as_str() {
        "binance" => binance::BinanceSource::global(),
        "binanceus" => binance::BinanceSource::us(),
        _ => return None,
    };

    let source = source.with_urls(cfg.rest_url.clone(), cfg.ws_url.clone());
    Some(Arc::new(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(name: &str) -> SourceConfig {
        SourceConfig {
            name: name.into(),
            rest_url: None,
            ws_url: None,
        }
    }

    #[test]
    fn resolves_known_sources() {
        assert_eq!(get_source(&cfg("binance")).unwrap().name(), "binance");
        assert_eq!(get_source(&cfg("binanceus")).unwrap().name(), "binanceus");
        assert!(get_source(&cfg("gateio")).is_none());
    }
}
