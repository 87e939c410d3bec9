/// Utility helpers shared by the collector and the gap fixer.
///
/// This module contains:
/// - Time helpers
/// - Symbol conversion for exchange requests
/// - CLI time parsing
///
/// IMPORTANT:
/// - No exchange I/O or storage logic should live here.
///
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveDateTime, TimeZone, Utc};

use crate::error::Error;

/// Layout of `--from` / `--to` on the command line (UTC).
///
/// Example: "2017-08-17_04:00:00"
pub const TIME_LAYOUT: &str = "%Y-%m-%d_%H:%M:%S";

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before UNIX_EPOCH.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Parses a `TIME_LAYOUT` timestamp as UTC and returns epoch milliseconds.
pub fn parse_time_ms(raw: &str) -> Result<i64, Error> {
    let naive = NaiveDateTime::parse_from_str(raw, TIME_LAYOUT)
        .map_err(|e| Error::Config(format!("parse time {raw:?}: {e}")))?;
    Ok(Utc.from_utc_datetime(&naive).timestamp_millis())
}

/// Convert an internal symbol into the exchange-specific format.
///
/// Examples:
/// - ("binance", "BTC/USDT")  -> "BTCUSDT"
/// - ("binance", "btcusdt")   -> "BTCUSDT"
///
pub fn symbol_to_exchange(exchange: &str, symbol: &str) -> String {
    match exchange {
        "binance" | "binanceus" => symbol.replace(['/', '-', '_'], "").to_uppercase(),
        _ => symbol.to_string(),
    }
}

/// Storage-side series name: lowercase, separators stripped.
///
/// Mirrors the per-series table naming (`kline_<symbol>_<interval>`),
/// so "BTC/USDT" and "BTCUSDT" land in the same series.
pub fn storage_symbol(symbol: &str) -> String {
    symbol.replace(['/', '-', '_'], "").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_layout_as_utc() {
        assert_eq!(parse_time_ms("1970-01-01_00:00:01").unwrap(), 1_000);
        assert_eq!(
            parse_time_ms("2017-08-17_04:00:00").unwrap(),
            1_502_942_400_000
        );
    }

    #[test]
    fn rejects_other_layouts() {
        assert!(matches!(
            parse_time_ms("2017-08-17T04:00:00Z"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn binance_symbols_have_no_separator() {
        assert_eq!(symbol_to_exchange("binance", "btc/usdt"), "BTCUSDT");
        assert_eq!(symbol_to_exchange("binanceus", "ETH-USD"), "ETHUSD");
        assert_eq!(storage_symbol("BTC/USDT"), "btcusdt");
    }
}
