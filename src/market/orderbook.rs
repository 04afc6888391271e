//! Order book with generation-gated updates
//!
//! Maintains sorted bid/ask ladders keyed by decimal price, fused from a
//! REST depth snapshot and the live diff stream. Every level update carries
//! the generation (`lastUpdateId` for snapshots, `u` for diffs) it belongs
//! to; updates older than the book's generation are rejected so replayed or
//! out-of-order diffs cannot corrupt the ladder.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Price-sorted bid/ask ladder for a single symbol
///
/// `BTreeMap` keeps each side ordered by price; bids are queried from the
/// back (highest first), asks from the front. A level's volume is absolute:
/// setting it again with the same value is a no-op, setting it to zero
/// removes the level.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    /// Last applied generation; never decreases
    generation: u64,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            generation: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sets one bid level.
    ///
    /// Returns +1 when a new level was inserted, -1 when an existing level
    /// was removed (zero volume), 0 for an in-place volume change or a
    /// rejected stale update. Updates with `generation` below the book's are
    /// rejected without touching state; equal generations are accepted so a
    /// diff's levels, which all share one `u`, can land as a batch.
    pub fn bid(&mut self, price: Decimal, volume: Decimal, generation: u64) -> i8 {
        if generation < self.generation {
            return 0;
        }
        self.generation = generation;
        Self::set_level(&mut self.bids, price, volume)
    }

    /// Sets one ask level. Same contract as [`bid`](Self::bid).
    pub fn ask(&mut self, price: Decimal, volume: Decimal, generation: u64) -> i8 {
        if generation < self.generation {
            return 0;
        }
        self.generation = generation;
        Self::set_level(&mut self.asks, price, volume)
    }

    fn set_level(side: &mut BTreeMap<Decimal, Decimal>, price: Decimal, volume: Decimal) -> i8 {
        if volume.is_zero() {
            if side.remove(&price).is_some() {
                -1
            } else {
                0
            }
        } else if side.insert(price, volume).is_none() {
            1
        } else {
            0
        }
    }

    /// Replaces the whole book with a snapshot.
    ///
    /// Afterwards the book holds exactly the snapshot's non-zero levels and
    /// its generation is `generation`, regardless of what was applied
    /// before. Callers serialize this against stream dispatch; the book
    /// itself is single-owner.
    pub fn commit(
        &mut self,
        generation: u64,
        bids: impl IntoIterator<Item = (Decimal, Decimal)>,
        asks: impl IntoIterator<Item = (Decimal, Decimal)>,
    ) {
        self.bids.clear();
        self.asks.clear();
        for (price, volume) in bids {
            if !volume.is_zero() {
                self.bids.insert(price, volume);
            }
        }
        for (price, volume) in asks {
            if !volume.is_zero() {
                self.asks.insert(price, volume);
            }
        }
        self.generation = generation;
    }

    /// Highest bid price, `None` when the side is empty.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest ask price, `None` when the side is empty.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    pub fn bid_volume(&self, price: &Decimal) -> Option<Decimal> {
        self.bids.get(price).copied()
    }

    pub fn ask_volume(&self, price: &Decimal) -> Option<Decimal> {
        self.asks.get(price).copied()
    }

    /// Top `n` bid levels, highest price first. Point-in-time copies.
    pub fn top_bids(&self, n: usize) -> Vec<(Decimal, Decimal)> {
        self.bids.iter().rev().take(n).map(|(p, v)| (*p, *v)).collect()
    }

    /// Top `n` ask levels, lowest price first. Point-in-time copies.
    pub fn top_asks(&self, n: usize) -> Vec<(Decimal, Decimal)> {
        self.asks.iter().take(n).map(|(p, v)| (*p, *v)).collect()
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// True when best bid >= best ask. A crossed book is kept observable,
    /// never normalized away.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }
}
