//! Candlestick series
//!
//! Per-symbol OHLCV series over the fixed period set. Ingestion normalizes
//! the wire shape: open times arrive in milliseconds and are stored as
//! seconds, volumes are rounded to 4 decimal places.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

use crate::error::FeedError;

/// Recognized candle periods, in minutes.
pub const PERIODS: [u32; 12] = [1, 5, 15, 30, 60, 120, 240, 360, 720, 1440, 4320, 10080];

/// Exchange interval label for a period in minutes.
pub fn interval_label(minutes: u32) -> Result<&'static str, FeedError> {
    match minutes {
        1 => Ok("1m"),
        5 => Ok("5m"),
        15 => Ok("15m"),
        30 => Ok("30m"),
        60 => Ok("1h"),
        120 => Ok("2h"),
        240 => Ok("4h"),
        360 => Ok("6h"),
        720 => Ok("12h"),
        1440 => Ok("1d"),
        4320 => Ok("3d"),
        10080 => Ok("1w"),
        other => Err(FeedError::Config(format!("unknown kline period: {}", other))),
    }
}

/// Period in minutes for an exchange interval label.
pub fn interval_minutes(label: &str) -> Result<u32, FeedError> {
    match label {
        "1m" => Ok(1),
        "5m" => Ok(5),
        "15m" => Ok(15),
        "30m" => Ok(30),
        "1h" => Ok(60),
        "2h" => Ok(120),
        "4h" => Ok(240),
        "6h" => Ok(360),
        "12h" => Ok(720),
        "1d" => Ok(1440),
        "3d" => Ok(4320),
        "1w" => Ok(10080),
        other => Err(FeedError::Config(format!("unknown kline interval: {}", other))),
    }
}

/// One normalized candle
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    /// Open time in seconds
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Rounded to 4 decimal places on ingestion
    pub volume: Decimal,
}

/// Candle series per period for a single symbol
#[derive(Debug, Clone)]
pub struct KLineSeries {
    symbol: String,
    series: BTreeMap<u32, Vec<Candle>>,
}

impl KLineSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            series: PERIODS.iter().map(|p| (*p, Vec::new())).collect(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Normalizes a wire candle without storing it.
    ///
    /// Live stream candles are forwarded on the bus in this form but not
    /// appended; only the history snapshot populates the series.
    pub fn normalize(
        open_time_ms: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Candle {
        Candle {
            open_time: open_time_ms / 1000,
            open,
            high,
            low,
            close,
            volume: volume.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero),
        }
    }

    /// Normalizes and appends one candle to a period's series.
    pub fn add(
        &mut self,
        period: u32,
        open_time_ms: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<(), FeedError> {
        let candle = Self::normalize(open_time_ms, open, high, low, close, volume);
        self.series
            .get_mut(&period)
            .ok_or_else(|| FeedError::Config(format!("unknown kline period: {}", period)))?
            .push(candle);
        Ok(())
    }

    pub fn candles(&self, period: u32) -> Option<&[Candle]> {
        self.series.get(&period).map(|v| v.as_slice())
    }

    /// Full copy of every period's series.
    pub fn snapshot(&self) -> BTreeMap<u32, Vec<Candle>> {
        self.series.clone()
    }
}
