//! Per-symbol market state
//!
//! The three stores the stream engine maintains for every subscribed symbol:
//! a generation-gated order book, the trade tapes, and the candle series.

pub mod kline;
pub mod orderbook;
pub mod tradebook;

use serde::{Deserialize, Serialize};

pub use kline::{Candle, KLineSeries};
pub use orderbook::OrderBook;
pub use tradebook::{TradeBook, TradeEntry};

/// Taker direction of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Upstream wire form ("BUY" / "SELL")
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}
