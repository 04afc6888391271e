//! Rolling trade tapes
//!
//! Two append-only tapes per symbol: the public market tape seeded from the
//! recent-trades snapshot, and the own-trades tape. The upstream may repost
//! a trade id; entries are kept as received, no dedupe.

use rust_decimal::Decimal;

use crate::market::Side;

/// One tape entry
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEntry {
    pub tid: i64,
    pub side: Side,
    /// Trade time in seconds
    pub created_at: i64,
    pub price: Decimal,
    pub amount: Decimal,
    /// Resting sell order id, when the upstream reports it
    pub ask_id: Option<i64>,
    /// Resting buy order id, when the upstream reports it
    pub bid_id: Option<i64>,
}

/// Market tape plus own-trades tape for a single symbol
#[derive(Debug, Clone, Default)]
pub struct TradeBook {
    symbol: String,
    market: Vec<TradeEntry>,
    own: Vec<TradeEntry>,
}

impl TradeBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            market: Vec::new(),
            own: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn add(&mut self, entry: TradeEntry) {
        self.market.push(entry);
    }

    /// Up to `n` most recent market trades, newest first.
    pub fn fetch(&self, n: usize) -> Vec<TradeEntry> {
        self.market.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.market.len()
    }

    pub fn is_empty(&self) -> bool {
        self.market.is_empty()
    }

    pub fn add_own(&mut self, entry: TradeEntry) {
        self.own.push(entry);
    }

    /// All own trades, newest first.
    pub fn own_trades(&self) -> Vec<TradeEntry> {
        self.own.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn entry(tid: i64, side: Side, created_at: i64) -> TradeEntry {
        TradeEntry {
            tid,
            side,
            created_at,
            price: Decimal::from_str("10").unwrap(),
            amount: Decimal::from_str("0.5").unwrap(),
            ask_id: None,
            bid_id: None,
        }
    }

    #[test]
    fn fetch_returns_newest_first() {
        let mut book = TradeBook::new("btcusdt");
        book.add(entry(1, Side::Buy, 1000));
        book.add(entry(2, Side::Sell, 1001));
        book.add(entry(3, Side::Buy, 1002));

        let recent = book.fetch(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].tid, 3);
        assert_eq!(recent[1].tid, 2);
        assert!(recent[0].created_at >= recent[1].created_at);
    }

    #[test]
    fn fetch_is_bounded_by_tape_length() {
        let mut book = TradeBook::new("btcusdt");
        book.add(entry(1, Side::Buy, 1000));
        assert_eq!(book.fetch(10).len(), 1);
        assert!(TradeBook::new("empty").fetch(5).is_empty());
    }

    #[test]
    fn duplicate_trade_ids_are_kept() {
        let mut book = TradeBook::new("btcusdt");
        book.add(entry(7, Side::Buy, 1000));
        book.add(entry(7, Side::Buy, 1000));
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn own_trades_are_a_separate_tape() {
        let mut book = TradeBook::new("btcusdt");
        book.add(entry(1, Side::Buy, 1000));
        book.add_own(TradeEntry {
            ask_id: Some(901),
            bid_id: Some(902),
            ..entry(2, Side::Sell, 1001)
        });

        assert_eq!(book.fetch(10).len(), 1);
        let own = book.own_trades();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].tid, 2);
        assert_eq!(own[0].ask_id, Some(901));
    }
}
