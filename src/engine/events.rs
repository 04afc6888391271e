//! Event bus and readiness signaling
//!
//! Normalized market updates fan out to consumers over a broadcast channel.
//! Events carry copies of the per-symbol state, never references into the
//! engine's stores. Publishing with no subscribers is fine; a lagging
//! subscriber loses the oldest events, not the newest.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};

use crate::market::{Candle, KLineSeries, OrderBook, Side, TradeBook};

/// Normalized 24h ticker payload
#[derive(Debug, Clone)]
pub struct TickerInfo {
    pub low: Decimal,
    pub high: Decimal,
    pub last: Decimal,
    pub volume: Decimal,
    pub open: Decimal,
    /// Best ask
    pub sell: Decimal,
    /// Best bid
    pub buy: Decimal,
    pub avg_price: Decimal,
    /// Kept as the raw wire string
    pub price_change_percent: String,
}

/// Normalized live trade payload
#[derive(Debug, Clone)]
pub struct TradeInfo {
    pub tid: i64,
    pub side: Side,
    /// Trade time in seconds
    pub date: i64,
    pub price: Decimal,
    pub amount: Decimal,
}

/// Everything the engine and trader publish
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// All order books committed their first snapshot
    OrderBookOpen(HashMap<String, OrderBook>),
    /// All trade tapes seeded
    TradeBookOpen(HashMap<String, TradeBook>),
    /// Every period of every symbol loaded its history
    KlineOpen(HashMap<String, KLineSeries>),
    Ticker {
        symbol: String,
        data: TickerInfo,
    },
    Trade {
        symbol: String,
        data: TradeInfo,
    },
    Kline {
        symbol: String,
        period: u32,
        data: Candle,
    },
    /// Transport or upstream failure; a supervisor decides what to do
    Error(String),
}

/// Named-event fan-out over a broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Delivers to current subscribers; no subscribers is not an error.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Edge-triggered readiness gate
///
/// Flipped once by the engine when every initial snapshot has landed.
/// Waiters subscribed before the flip wake exactly once when it happens;
/// waiters arriving after it return immediately.
#[derive(Debug, Clone)]
pub struct ReadyGate {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl ReadyGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves when the gate is (or becomes) ready.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in self, so wait_for cannot fail here
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}
