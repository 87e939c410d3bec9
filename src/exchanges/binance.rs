use std::str::FromStr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use rand::random_range;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message, tungstenite::Utf8Bytes};
use tokio_util::sync::CancellationToken;

use crate::{
    error::SourceError,
    metrics::METRICS,
    schema::{Candle, Series, StreamEvent},
    util,
};

use super::adapter::{MarketDataSource, ParseResult, Subscription};

/// Binance rejects kline requests with `limit` above this.
pub const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Capacity of the event / error channels handed to the collector.
const CHANNEL_CAPACITY: usize = 1024;

/// Base delay before reconnecting the live feed.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Binance spot market data adapter (Global and US).
///
/// REST:
/// https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints
///
/// WS:
/// https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams
///
/// One WebSocket connection per subscription, one kline stream on it.
#[derive(Debug, Clone)]
pub struct BinanceSource {
    name: &'static str,
    rest_url: String,
    ws_url: String,
    http: reqwest::Client,
}

impl BinanceSource {
    pub fn global() -> Self {
        Self::new(
            "binance",
            "https://api.binance.com",
            "wss://stream.binance.com:9443/ws",
        )
    }

    pub fn us() -> Self {
        Self::new(
            "binanceus",
            "https://api.binance.us",
            "wss://stream.binance.us:9443/ws",
        )
    }

    fn new(name: &'static str, rest_url: &str, ws_url: &str) -> Self {
        Self {
            name,
            rest_url: rest_url.to_string(),
            ws_url: ws_url.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Replaces the default endpoints where an override is given.
    pub fn with_urls(mut self, rest_url: Option<String>, ws_url: Option<String>) -> Self {
        if let Some(url) = rest_url {
            self.rest_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = ws_url {
            self.ws_url = url;
        }
        self
    }

    /// Stream name for a series, e.g. "btcusdt@kline_1m".
    pub fn stream_name(&self, series: &Series) -> String {
        format!(
            "{}@kline_{}",
            util::symbol_to_exchange(self.name, &series.symbol).to_lowercase(),
            series.interval
        )
    }
}

#[async_trait::async_trait]
impl MarketDataSource for BinanceSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn max_batch(&self) -> Option<usize> {
        Some(MAX_KLINES_PER_REQUEST)
    }

    async fn fetch_range(
        &self,
        series: &Series,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/api/v3/klines", self.rest_url),
            &[
                ("symbol", util::symbol_to_exchange(self.name, &series.symbol)),
                ("interval", series.interval.to_string()),
                ("startTime", start.to_string()),
                ("endTime", end.to_string()),
                ("limit", limit.min(MAX_KLINES_PER_REQUEST).to_string()),
            ],
        )
        .map_err(|e| SourceError::Decode(format!("klines url: {e}")))?;

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_rest_klines(&body)
    }

    async fn subscribe(
        &self,
        series: &Series,
        cancel: CancellationToken,
    ) -> Result<Subscription, SourceError> {
        let (events_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
        let (errors_tx, errors) = mpsc::channel(CHANNEL_CAPACITY);

        let stream = self.stream_name(series);
        let ws_url = self.ws_url.clone();

        tokio::spawn(async move {
            run_kline_stream(ws_url, stream, events_tx, errors_tx, cancel).await;
        });

        Ok(Subscription { events, errors })
    }
}

/// Builds the SUBSCRIBE request for a set of stream names.
pub fn build_subscribe_message(streams: &[String]) -> Value {
    json!({
        "method": "SUBSCRIBE",
        "params": streams,
        "id": util::now_ms()
    })
}

/// Runs the live kline stream until cancelled or the consumer goes away.
///
/// This loop:
/// - Connects and subscribes
/// - Forwards parsed kline events
/// - Reports every transport / decode problem on the error channel
/// - Reconnects after a jittered delay
///
/// Dropping both senders on return closes the subscription.
async fn run_kline_stream(
    ws_url: String,
    stream: String,
    events: mpsc::Sender<StreamEvent>,
    errors: mpsc::Sender<SourceError>,
    cancel: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            res = connect_async(ws_url.as_str()) => res,
        };

        match connected {
            Ok((ws, _)) => {
                let (mut write, mut read) = ws.split();

                let sub = build_subscribe_message(std::slice::from_ref(&stream));
                if let Err(e) = write
                    .send(Message::Text(Utf8Bytes::from(sub.to_string())))
                    .await
                {
                    report(&errors, e.into()).await;
                } else {
                    debug!("subscribed to {stream}");

                    loop {
                        let msg = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                let _ = write.send(Message::Close(None)).await;
                                return;
                            }
                            msg = read.next() => msg,
                        };

                        match msg {
                            Some(Ok(Message::Text(text))) => match parse_message(&text) {
                                ParseResult::Event(event) => {
                                    // Consumer gone: nothing left to feed
                                    if events.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                ParseResult::Control => {}
                                ParseResult::Error(e) => report(&errors, e).await,
                            },

                            // Pong is queued by tungstenite, flush it out
                            Some(Ok(Message::Ping(_))) => {
                                if let Err(e) = write.flush().await {
                                    report(&errors, e.into()).await;
                                    break;
                                }
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                report(&errors, SourceError::Closed).await;
                                break;
                            }

                            // Ignore binary / pong frames
                            Some(Ok(_)) => {}

                            Some(Err(e)) => {
                                report(&errors, e.into()).await;
                                break;
                            }
                        }
                    }
                }
            }

            Err(e) => report(&errors, e.into()).await,
        }

        METRICS.ws_reconnects.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let delay = RECONNECT_DELAY + Duration::from_millis(random_range(0..1000));
        warn!("kline stream {stream} reconnecting in {delay:?}");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(delay) => {}
        }
    }
}

async fn report(errors: &mpsc::Sender<SourceError>, err: SourceError) {
    // A closed error channel only means nobody is listening anymore
    let _ = errors.send(err).await;
}

// ------------------------------------------------------------
// Wire formats
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "k")]
    kline: WsKline,
}

#[derive(Debug, Deserialize)]
struct WsKline {
    #[serde(rename = "t")]
    start_time: i64,
    #[serde(rename = "T")]
    end_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "n")]
    trade_num: i64,
    #[serde(rename = "x")]
    is_final: bool,
}

impl TryFrom<WsKlineEvent> for StreamEvent {
    type Error = SourceError;

    fn try_from(ev: WsKlineEvent) -> Result<Self, Self::Error> {
        let k = ev.kline;
        let candle = checked(Candle {
            open_time: k.start_time,
            close_time: k.end_time,
            open: decimal("open", &k.open)?,
            high: decimal("high", &k.high)?,
            low: decimal("low", &k.low)?,
            close: decimal("close", &k.close)?,
            volume: decimal("volume", &k.volume)?,
            trade_num: k.trade_num,
        })?;

        Ok(StreamEvent {
            event_time: ev.event_time,
            candle,
            is_final: k.is_final,
        })
    }
}

/// Parses one WebSocket text frame.
///
/// Must never panic: anything unexpected is either `Control`
/// (not market data) or `Error` (market data we could not read).
pub fn parse_message(raw: &str) -> ParseResult {
    let v: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return ParseResult::Error(SourceError::Decode(format!("frame: {e}"))),
    };

    // { "error": { "code": 2, "msg": "Invalid request" }, "id": 1 }
    if let Some(err) = v.get("error") {
        return ParseResult::Error(SourceError::Rejected(err.to_string()));
    }

    // { "result": null, "id": 123 }
    if v.get("result").is_some() {
        return ParseResult::Control;
    }

    // Combined stream wrapper
    let data = v.get("data").unwrap_or(&v);

    match data.get("e").and_then(|e| e.as_str()) {
        Some("kline") => {
            let parsed = serde_json::from_value::<WsKlineEvent>(data.clone())
                .map_err(|e| SourceError::Decode(format!("kline event: {e}")))
                .and_then(StreamEvent::try_from);

            match parsed {
                Ok(event) => ParseResult::Event(event),
                Err(e) => ParseResult::Error(e),
            }
        }
        _ => ParseResult::Control,
    }
}

/// Parses a `/api/v3/klines` response body.
///
/// Each row is an array:
/// `[openTime, "open", "high", "low", "close", "volume", closeTime, "quoteVolume", trades, ...]`
pub fn parse_rest_klines(body: &str) -> Result<Vec<Candle>, SourceError> {
    let rows: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(format!("klines: {e}")))?;

    rows.iter()
        .map(|row| {
            checked(Candle {
                open_time: row_i64(row, 0, "open_time")?,
                open: row_decimal(row, 1, "open")?,
                high: row_decimal(row, 2, "high")?,
                low: row_decimal(row, 3, "low")?,
                close: row_decimal(row, 4, "close")?,
                volume: row_decimal(row, 5, "volume")?,
                close_time: row_i64(row, 6, "close_time")?,
                trade_num: row_i64(row, 8, "trade_num")?,
            })
        })
        .collect()
}

fn row_i64(row: &[Value], idx: usize, field: &str) -> Result<i64, SourceError> {
    row.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| SourceError::Decode(format!("{field}: expected integer at column {idx}")))
}

fn row_decimal(row: &[Value], idx: usize, field: &str) -> Result<Decimal, SourceError> {
    let raw = row
        .get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| SourceError::Decode(format!("{field}: expected string at column {idx}")))?;
    decimal(field, raw)
}

fn decimal(field: &str, raw: &str) -> Result<Decimal, SourceError> {
    Decimal::from_str(raw).map_err(|e| SourceError::Decode(format!("{field} {raw:?}: {e}")))
}

fn checked(candle: Candle) -> Result<Candle, SourceError> {
    if candle.is_well_formed() {
        Ok(candle)
    } else {
        Err(SourceError::Decode(format!(
            "close_time {} not after open_time {}",
            candle.close_time, candle.open_time
        )))
    }
}
