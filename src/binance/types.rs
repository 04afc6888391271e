//! Binance API Type Definitions
//!
//! Wire shapes for the REST responses and WebSocket events the feed
//! consumes. Stream payloads use Binance's single-letter field names and are
//! mapped through `#[serde(rename)]`; numeric fields arrive as exact strings
//! and are parsed into decimals at the edge.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::FeedError;

/// Parses a wire decimal string, naming the offending field on failure.
pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, FeedError> {
    Decimal::from_str(value).map_err(|e| FeedError::Parse(format!("invalid {}: {}", field, e)))
}

/// Response from /api/v3/depth
///
/// Full order book snapshot, levels as `[price, quantity]` string pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    /// Generation of the snapshot; diffs at or below it are already included
    pub last_update_id: u64,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

/// One entry from /api/v3/trades
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentTrade {
    pub id: i64,
    pub price: String,
    pub qty: String,
    /// Trade time in milliseconds
    pub time: i64,
    pub is_buyer_maker: bool,
}

/// Acknowledgement from POST /api/v3/order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: i64,
}

/// Extracts `(open_time_ms, open, high, low, close, volume)` from one row of
/// /api/v3/klines.
///
/// Binance sends 12 columns per row; only the first six carry OHLCV data.
pub fn kline_row(
    row: &Value,
) -> Result<(i64, Decimal, Decimal, Decimal, Decimal, Decimal), FeedError> {
    let columns = row
        .as_array()
        .ok_or_else(|| FeedError::Parse("kline row is not an array".to_string()))?;
    if columns.len() < 6 {
        return Err(FeedError::Parse(format!(
            "kline row has {} columns, expected at least 6",
            columns.len()
        )));
    }

    let open_time = columns[0]
        .as_i64()
        .ok_or_else(|| FeedError::Parse("kline open time is not an integer".to_string()))?;

    let mut fields = [Decimal::ZERO; 5];
    for (i, name) in ["open", "high", "low", "close", "volume"].iter().enumerate() {
        let raw = columns[i + 1]
            .as_str()
            .ok_or_else(|| FeedError::Parse(format!("kline {} is not a string", name)))?;
        fields[i] = parse_decimal(name, raw)?;
    }

    Ok((
        open_time, fields[0], fields[1], fields[2], fields[3], fields[4],
    ))
}

/// Envelope of a combined-stream frame: `{"stream": "<symbol>@<kind>", "data": ...}`
#[derive(Debug, Clone, Deserialize)]
pub struct StreamFrame {
    pub stream: String,
    pub data: Value,
}

/// Depth diff from the `<symbol>@depth` stream
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DepthDiff {
    #[serde(rename = "E")]
    pub event_time: i64,

    /// First update id covered by this diff
    #[serde(rename = "U")]
    pub first_update_id: u64,

    /// Final update id covered by this diff
    #[serde(rename = "u")]
    pub final_update_id: u64,

    /// Bid levels to set, volume "0" removes
    #[serde(rename = "b")]
    pub bids: Vec<(String, String)>,

    /// Ask levels to set, volume "0" removes
    #[serde(rename = "a")]
    pub asks: Vec<(String, String)>,
}

/// 24h rolling ticker from the `<symbol>@ticker` stream
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TickerEvent {
    #[serde(rename = "E")]
    pub event_time: i64,

    #[serde(rename = "P")]
    pub price_change_percent: String,

    /// Weighted average price
    #[serde(rename = "w")]
    pub avg_price: String,

    /// Last traded price
    #[serde(rename = "c")]
    pub last: String,

    #[serde(rename = "o")]
    pub open: String,

    #[serde(rename = "h")]
    pub high: String,

    #[serde(rename = "l")]
    pub low: String,

    /// Best bid price
    #[serde(rename = "b")]
    pub best_bid: String,

    /// Best ask price
    #[serde(rename = "a")]
    pub best_ask: String,

    /// Base asset volume
    #[serde(rename = "v")]
    pub volume: String,
}

/// Trade from the `<symbol>@trade` stream
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradeEvent {
    #[serde(rename = "E")]
    pub event_time: i64,

    /// Trade id
    #[serde(rename = "t")]
    pub tid: i64,

    #[serde(rename = "p")]
    pub price: String,

    #[serde(rename = "q")]
    pub quantity: String,

    /// True when the buyer was the resting order
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

/// Candle update from a `<symbol>@kline_<interval>` stream
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KlineEvent {
    #[serde(rename = "E")]
    pub event_time: i64,

    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

/// The `k` sub-object of a kline event
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KlinePayload {
    /// Candle open time in milliseconds
    #[serde(rename = "t")]
    pub open_time: i64,

    #[serde(rename = "i")]
    pub interval: String,

    #[serde(rename = "o")]
    pub open: String,

    #[serde(rename = "h")]
    pub high: String,

    #[serde(rename = "l")]
    pub low: String,

    #[serde(rename = "c")]
    pub close: String,

    #[serde(rename = "v")]
    pub volume: String,
}
