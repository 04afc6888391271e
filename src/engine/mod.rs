//! Stream engine
//!
//! Owns the per-symbol market state and keeps it synchronized with the
//! upstream. One combined WebSocket carries every subscribed stream; REST
//! snapshot requests run concurrently and report back over a channel. A
//! single dispatcher task consumes both, so store mutations never race and
//! per-symbol event order follows frame arrival.
//!
//! Startup is gated by three counters (depth, trades, klines). Each
//! successful snapshot decrements its counter; at zero the matching `*_open`
//! event fires with copies of the stores, and when all three hit zero the
//! aggregate ready gate flips. A failed snapshot publishes `error` and does
//! not decrement: the barrier never completes and a supervisor is expected
//! to stop and restart the engine.

pub mod events;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::binance::types::{self, DepthDiff, DepthSnapshot, KlineEvent, RecentTrade, StreamFrame, TickerEvent, TradeEvent};
use crate::binance::{websocket, Client};
use crate::config::Config;
use crate::error::FeedError;
use crate::market::{kline, KLineSeries, OrderBook, Side, TradeBook, TradeEntry};

pub use events::{BusEvent, EventBus, ReadyGate, TickerInfo, TradeInfo};

/// Seed size for the recent-trades tape
const RECENT_TRADES_LIMIT: u32 = 100;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Outcome of one REST snapshot request, routed back to the dispatcher.
enum SnapshotResult {
    Depth {
        symbol: String,
        outcome: Result<DepthSnapshot, FeedError>,
    },
    Trades {
        symbol: String,
        outcome: Result<Vec<RecentTrade>, FeedError>,
    },
    Klines {
        symbol: String,
        period: u32,
        outcome: Result<Vec<serde_json::Value>, FeedError>,
    },
}

/// Upstream stream engine
///
/// `start` spawns the dispatcher; `stop` cancels it and releases the
/// per-symbol stores. The engine holds no reconnect logic: after a
/// connection loss it publishes `error` and goes quiet.
pub struct StreamEngine {
    client: Arc<Client>,
    ws_endpoint: String,
    bus: EventBus,
    ready: ReadyGate,
    shutdown: CancellationToken,
    dispatcher: Option<JoinHandle<()>>,
}

impl StreamEngine {
    pub fn new(client: Arc<Client>, config: &Config) -> Self {
        Self {
            client,
            ws_endpoint: config.ws_endpoint.clone(),
            bus: EventBus::default(),
            ready: ReadyGate::new(),
            shutdown: CancellationToken::new(),
            dispatcher: None,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Gate that flips once every initial snapshot has landed.
    pub fn ready(&self) -> ReadyGate {
        self.ready.clone()
    }

    /// Subscribes the combined stream and begins loading snapshots.
    ///
    /// Symbols are canonicalized to lowercase, the form stream names use and
    /// the key under which events report them.
    pub fn start(&mut self, markets: &[String]) -> Result<(), FeedError> {
        if markets.is_empty() {
            return Err(FeedError::Config("markets list is empty".to_string()));
        }
        if self.dispatcher.is_some() {
            return Err(FeedError::Config("engine already started".to_string()));
        }

        let markets: Vec<String> = markets.iter().map(|m| m.to_lowercase()).collect();
        let handle = tokio::spawn(run_dispatcher(
            self.client.clone(),
            self.ws_endpoint.clone(),
            markets,
            self.bus.clone(),
            self.ready.clone(),
            self.shutdown.clone(),
        ));
        self.dispatcher = Some(handle);
        Ok(())
    }

    /// Closes the socket and drops the per-symbol stores.
    ///
    /// Outstanding snapshot requests may still complete; their results land
    /// in a closed channel and are discarded.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.await;
        }
    }
}

async fn run_dispatcher(
    client: Arc<Client>,
    ws_endpoint: String,
    markets: Vec<String>,
    bus: EventBus,
    ready: ReadyGate,
    shutdown: CancellationToken,
) {
    let mut socket = match websocket::connect_combined(&ws_endpoint, &markets).await {
        Ok(socket) => socket,
        Err(e) => {
            bus.publish(BusEvent::Error(e.to_string()));
            return;
        }
    };

    // Socket is open: issue every per-symbol snapshot request.
    let (tx, mut rx) = mpsc::channel::<SnapshotResult>(SNAPSHOT_CHANNEL_CAPACITY);
    for symbol in &markets {
        spawn_symbol_snapshots(&client, symbol, &tx);
    }

    let mut state = EngineState::new(&markets, bus.clone(), ready);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = socket.close(None).await;
                tracing::info!("stream engine stopped");
                break;
            }
            Some(result) = rx.recv() => {
                state.on_snapshot(result);
            }
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<StreamFrame>(&text) {
                        Ok(frame) => {
                            if let Some(symbol) = state.on_frame(frame) {
                                spawn_depth_snapshot(&client, &symbol, &tx);
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "unparseable stream frame"),
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::warn!(frame = ?frame, "combined stream closed by upstream");
                    bus.publish(BusEvent::Error("combined stream closed".to_string()));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    bus.publish(BusEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    bus.publish(BusEvent::Error("combined stream ended".to_string()));
                    break;
                }
            }
        }
    }
}

/// Issues the depth, trades, and per-period kline snapshots for one symbol.
fn spawn_symbol_snapshots(client: &Arc<Client>, symbol: &str, tx: &mpsc::Sender<SnapshotResult>) {
    spawn_depth_snapshot(client, symbol, tx);

    {
        let client = client.clone();
        let tx = tx.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            let outcome = client.recent_trades(&symbol, RECENT_TRADES_LIMIT).await;
            let _ = tx.send(SnapshotResult::Trades { symbol, outcome }).await;
        });
    }

    for period in kline::PERIODS {
        let client = client.clone();
        let tx = tx.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            let outcome = match kline::interval_label(period) {
                Ok(label) => client.klines(&symbol, label).await,
                Err(e) => Err(e),
            };
            let _ = tx
                .send(SnapshotResult::Klines {
                    symbol,
                    period,
                    outcome,
                })
                .await;
        });
    }
}

/// Issues a depth snapshot request; also used to resynchronize after a gap.
fn spawn_depth_snapshot(client: &Arc<Client>, symbol: &str, tx: &mpsc::Sender<SnapshotResult>) {
    let client = client.clone();
    let tx = tx.clone();
    let symbol = symbol.to_string();
    tokio::spawn(async move {
        let outcome = client.depth(&symbol).await;
        let _ = tx.send(SnapshotResult::Depth { symbol, outcome }).await;
    });
}

/// Dispatcher-owned state: the stores plus the startup barrier.
struct EngineState {
    books: HashMap<String, OrderBook>,
    tapes: HashMap<String, TradeBook>,
    series: HashMap<String, KLineSeries>,
    depth_pending: usize,
    trade_pending: usize,
    kline_pending: usize,
    /// Symbols whose book committed its first snapshot
    depth_seeded: HashSet<String>,
    /// Symbols with a resynchronization snapshot in flight
    resyncing: HashSet<String>,
    bus: EventBus,
    ready: ReadyGate,
}

impl EngineState {
    fn new(markets: &[String], bus: EventBus, ready: ReadyGate) -> Self {
        Self {
            books: markets
                .iter()
                .map(|m| (m.clone(), OrderBook::new(m.clone())))
                .collect(),
            tapes: markets
                .iter()
                .map(|m| (m.clone(), TradeBook::new(m.clone())))
                .collect(),
            series: markets
                .iter()
                .map(|m| (m.clone(), KLineSeries::new(m.clone())))
                .collect(),
            depth_pending: markets.len(),
            trade_pending: markets.len(),
            kline_pending: markets.len() * kline::PERIODS.len(),
            depth_seeded: HashSet::new(),
            resyncing: HashSet::new(),
            bus,
            ready,
        }
    }

    fn maybe_ready(&self) {
        if self.depth_pending == 0 && self.trade_pending == 0 && self.kline_pending == 0 {
            self.ready.set();
        }
    }

    fn on_snapshot(&mut self, result: SnapshotResult) {
        match result {
            SnapshotResult::Depth { symbol, outcome } => match outcome {
                Ok(snapshot) => self.commit_depth(&symbol, snapshot),
                Err(e) => {
                    self.resyncing.remove(&symbol);
                    tracing::error!(symbol = %symbol, error = %e, "depth snapshot failed");
                    self.bus.publish(BusEvent::Error(e.to_string()));
                }
            },
            SnapshotResult::Trades { symbol, outcome } => match outcome {
                Ok(trades) => self.seed_trades(&symbol, trades),
                Err(e) => {
                    tracing::error!(symbol = %symbol, error = %e, "recent trades snapshot failed");
                    self.bus.publish(BusEvent::Error(e.to_string()));
                }
            },
            SnapshotResult::Klines {
                symbol,
                period,
                outcome,
            } => match outcome {
                Ok(rows) => self.seed_klines(&symbol, period, rows),
                Err(e) => {
                    tracing::error!(symbol = %symbol, period, error = %e, "kline history failed");
                    self.bus.publish(BusEvent::Error(e.to_string()));
                }
            },
        }
    }

    fn commit_depth(&mut self, symbol: &str, snapshot: DepthSnapshot) {
        let Some(book) = self.books.get_mut(symbol) else {
            tracing::warn!(symbol = %symbol, "depth snapshot for unknown symbol");
            return;
        };

        let bids = match parse_levels(&snapshot.bids) {
            Ok(levels) => levels,
            Err(e) => {
                self.bus.publish(BusEvent::Error(e.to_string()));
                return;
            }
        };
        let asks = match parse_levels(&snapshot.asks) {
            Ok(levels) => levels,
            Err(e) => {
                self.bus.publish(BusEvent::Error(e.to_string()));
                return;
            }
        };

        book.commit(snapshot.last_update_id, bids, asks);
        tracing::info!(
            symbol = %symbol,
            generation = snapshot.last_update_id,
            "order book snapshot committed"
        );

        self.resyncing.remove(symbol);
        if self.depth_seeded.insert(symbol.to_string()) {
            self.depth_pending -= 1;
            if self.depth_pending == 0 {
                self.bus.publish(BusEvent::OrderBookOpen(self.books.clone()));
            }
            self.maybe_ready();
        }
    }

    fn seed_trades(&mut self, symbol: &str, trades: Vec<RecentTrade>) {
        let Some(tape) = self.tapes.get_mut(symbol) else {
            tracing::warn!(symbol = %symbol, "trades snapshot for unknown symbol");
            return;
        };

        let mut entries = Vec::with_capacity(trades.len());
        for trade in &trades {
            let price = types::parse_decimal("trade price", &trade.price);
            let amount = types::parse_decimal("trade amount", &trade.qty);
            let (price, amount) = match (price, amount) {
                (Ok(p), Ok(a)) => (p, a),
                (Err(e), _) | (_, Err(e)) => {
                    self.bus.publish(BusEvent::Error(e.to_string()));
                    return;
                }
            };
            // The upstream's convention: the maker-buyer side is labeled a buy.
            let side = if trade.is_buyer_maker {
                Side::Buy
            } else {
                Side::Sell
            };
            entries.push(TradeEntry {
                tid: trade.id,
                side,
                created_at: trade.time / 1000,
                price,
                amount,
                ask_id: None,
                bid_id: None,
            });
        }
        for entry in entries {
            tape.add(entry);
        }

        self.trade_pending -= 1;
        if self.trade_pending == 0 {
            self.bus.publish(BusEvent::TradeBookOpen(self.tapes.clone()));
        }
        self.maybe_ready();
    }

    fn seed_klines(&mut self, symbol: &str, period: u32, rows: Vec<serde_json::Value>) {
        let Some(series) = self.series.get_mut(symbol) else {
            tracing::warn!(symbol = %symbol, "kline history for unknown symbol");
            return;
        };

        let mut parsed = Vec::with_capacity(rows.len());
        for row in &rows {
            match types::kline_row(row) {
                Ok(fields) => parsed.push(fields),
                Err(e) => {
                    self.bus.publish(BusEvent::Error(e.to_string()));
                    return;
                }
            }
        }
        for (open_time, open, high, low, close, volume) in parsed {
            if let Err(e) = series.add(period, open_time, open, high, low, close, volume) {
                self.bus.publish(BusEvent::Error(e.to_string()));
                return;
            }
        }

        self.kline_pending -= 1;
        if self.kline_pending == 0 {
            self.bus.publish(BusEvent::KlineOpen(self.series.clone()));
        }
        self.maybe_ready();
    }

    /// Routes one combined-stream frame. Returns a symbol when its book
    /// needs a fresh snapshot.
    fn on_frame(&mut self, frame: StreamFrame) -> Option<String> {
        let Some((symbol, kind)) = frame.stream.split_once('@') else {
            tracing::warn!(stream = %frame.stream, "malformed stream name");
            return None;
        };
        let symbol = symbol.to_string();

        match kind {
            "depth" => self.on_depth(&symbol, frame.data),
            "ticker" => {
                self.on_ticker(&symbol, frame.data);
                None
            }
            "trade" => {
                self.on_trade(&symbol, frame.data);
                None
            }
            kind if kind.starts_with("kline_") => {
                self.on_kline(&symbol, &kind["kline_".len()..], frame.data);
                None
            }
            other => {
                tracing::warn!(stream = %frame.stream, kind = %other, "unknown stream kind");
                None
            }
        }
    }

    fn on_depth(&mut self, symbol: &str, data: serde_json::Value) -> Option<String> {
        let diff: DepthDiff = match serde_json::from_value(data) {
            Ok(diff) => diff,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "unparseable depth diff");
                return None;
            }
        };
        let Some(book) = self.books.get_mut(symbol) else {
            return None;
        };

        // Sequence checks only make sense once a snapshot is in; diffs that
        // race the first snapshot are applied and overwritten by the commit.
        if self.depth_seeded.contains(symbol) {
            let generation = book.generation();
            if diff.final_update_id <= generation {
                tracing::debug!(
                    symbol = %symbol,
                    u = diff.final_update_id,
                    generation,
                    "stale depth diff dropped"
                );
                return None;
            }
            if diff.first_update_id > generation + 1 {
                tracing::warn!(
                    symbol = %symbol,
                    expected = generation + 1,
                    first_update_id = diff.first_update_id,
                    final_update_id = diff.final_update_id,
                    "gap in depth stream, requesting a fresh snapshot"
                );
                if self.resyncing.insert(symbol.to_string()) {
                    return Some(symbol.to_string());
                }
                return None;
            }
        }

        let generation = diff.final_update_id;
        let mut net_bids: i32 = 0;
        let mut net_asks: i32 = 0;
        for (price, volume) in &diff.bids {
            let price = types::parse_decimal("bid price", price);
            let volume = types::parse_decimal("bid volume", volume);
            match (price, volume) {
                (Ok(p), Ok(v)) => net_bids += i32::from(book.bid(p, v, generation)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(symbol = %symbol, error = %e, "bad bid level in diff");
                    return None;
                }
            }
        }
        for (price, volume) in &diff.asks {
            let price = types::parse_decimal("ask price", price);
            let volume = types::parse_decimal("ask volume", volume);
            match (price, volume) {
                (Ok(p), Ok(v)) => net_asks += i32::from(book.ask(p, v, generation)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(symbol = %symbol, error = %e, "bad ask level in diff");
                    return None;
                }
            }
        }

        tracing::debug!(symbol = %symbol, generation, net_bids, net_asks, "depth diff applied");
        if book.is_crossed() {
            tracing::warn!(symbol = %symbol, "book is crossed after diff");
        }
        None
    }

    fn on_ticker(&mut self, symbol: &str, data: serde_json::Value) {
        let event: TickerEvent = match serde_json::from_value(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "unparseable ticker");
                return;
            }
        };

        let data = match normalize_ticker(&event) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "bad ticker payload");
                return;
            }
        };
        self.bus.publish(BusEvent::Ticker {
            symbol: symbol.to_string(),
            data,
        });
    }

    fn on_trade(&mut self, symbol: &str, data: serde_json::Value) {
        let event: TradeEvent = match serde_json::from_value(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "unparseable trade");
                return;
            }
        };

        let price = types::parse_decimal("trade price", &event.price);
        let amount = types::parse_decimal("trade amount", &event.quantity);
        let (price, amount) = match (price, amount) {
            (Ok(p), Ok(a)) => (p, a),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(symbol = %symbol, error = %e, "bad trade payload");
                return;
            }
        };

        // Same side convention as the snapshot seed; live trades are
        // published only, the tape stays as seeded.
        self.bus.publish(BusEvent::Trade {
            symbol: symbol.to_string(),
            data: TradeInfo {
                tid: event.tid,
                side: if event.buyer_is_maker {
                    Side::Buy
                } else {
                    Side::Sell
                },
                date: event.event_time / 1000,
                price,
                amount,
            },
        });
    }

    fn on_kline(&mut self, symbol: &str, label: &str, data: serde_json::Value) {
        let period = match kline::interval_minutes(label) {
            Ok(period) => period,
            Err(e) => {
                tracing::warn!(symbol = %symbol, label = %label, error = %e, "unknown kline stream");
                return;
            }
        };
        let event: KlineEvent = match serde_json::from_value(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "unparseable kline");
                return;
            }
        };

        let k = &event.kline;
        let fields = [
            ("open", &k.open),
            ("high", &k.high),
            ("low", &k.low),
            ("close", &k.close),
            ("volume", &k.volume),
        ];
        let mut parsed = [Decimal::ZERO; 5];
        for (i, (name, raw)) in fields.iter().enumerate() {
            match types::parse_decimal(name, raw) {
                Ok(value) => parsed[i] = value,
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "bad kline payload");
                    return;
                }
            }
        }

        let candle = KLineSeries::normalize(
            k.open_time,
            parsed[0],
            parsed[1],
            parsed[2],
            parsed[3],
            parsed[4],
        );
        self.bus.publish(BusEvent::Kline {
            symbol: symbol.to_string(),
            period,
            data: candle,
        });
    }
}

fn parse_levels(levels: &[(String, String)]) -> Result<Vec<(Decimal, Decimal)>, FeedError> {
    levels
        .iter()
        .map(|(price, volume)| {
            Ok((
                types::parse_decimal("level price", price)?,
                types::parse_decimal("level volume", volume)?,
            ))
        })
        .collect()
}

fn normalize_ticker(event: &TickerEvent) -> Result<TickerInfo, FeedError> {
    Ok(TickerInfo {
        low: types::parse_decimal("ticker low", &event.low)?,
        high: types::parse_decimal("ticker high", &event.high)?,
        last: types::parse_decimal("ticker last", &event.last)?,
        volume: types::parse_decimal("ticker volume", &event.volume)?,
        open: types::parse_decimal("ticker open", &event.open)?,
        sell: types::parse_decimal("ticker ask", &event.best_ask)?,
        buy: types::parse_decimal("ticker bid", &event.best_bid)?,
        avg_price: types::parse_decimal("ticker avg price", &event.avg_price)?,
        price_change_percent: event.price_change_percent.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;
    use tokio::sync::broadcast::error::TryRecvError;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn test_state(markets: &[&str]) -> (EngineState, tokio::sync::broadcast::Receiver<BusEvent>, ReadyGate) {
        let bus = EventBus::new(64);
        let rx = bus.subscribe();
        let ready = ReadyGate::new();
        let markets: Vec<String> = markets.iter().map(|m| m.to_string()).collect();
        (EngineState::new(&markets, bus, ready.clone()), rx, ready)
    }

    fn depth_ok(symbol: &str, last_update_id: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> SnapshotResult {
        SnapshotResult::Depth {
            symbol: symbol.to_string(),
            outcome: Ok(DepthSnapshot {
                last_update_id,
                bids: bids.iter().map(|(p, v)| (p.to_string(), v.to_string())).collect(),
                asks: asks.iter().map(|(p, v)| (p.to_string(), v.to_string())).collect(),
            }),
        }
    }

    fn trades_ok(symbol: &str) -> SnapshotResult {
        SnapshotResult::Trades {
            symbol: symbol.to_string(),
            outcome: Ok(vec![RecentTrade {
                id: 1,
                price: "10".to_string(),
                qty: "0.5".to_string(),
                time: 1_700_000_000_500,
                is_buyer_maker: true,
            }]),
        }
    }

    fn klines_ok(symbol: &str, period: u32) -> SnapshotResult {
        SnapshotResult::Klines {
            symbol: symbol.to_string(),
            period,
            outcome: Ok(vec![json!([
                1_700_000_000_000i64,
                "10",
                "11",
                "9",
                "10.5",
                "0.123456",
                0,
                "0",
                0,
                "0",
                "0",
                "0"
            ])]),
        }
    }

    fn depth_frame(symbol: &str, first: u64, last: u64, bids: serde_json::Value, asks: serde_json::Value) -> StreamFrame {
        StreamFrame {
            stream: format!("{}@depth", symbol),
            data: json!({
                "e": "depthUpdate",
                "E": 1_700_000_000_000i64,
                "s": symbol.to_uppercase(),
                "U": first,
                "u": last,
                "b": bids,
                "a": asks,
            }),
        }
    }

    #[tokio::test]
    async fn orderbook_open_waits_for_every_symbol() {
        let (mut state, mut rx, _ready) = test_state(&["btcusdt", "ethusdt"]);

        state.on_snapshot(depth_ok("btcusdt", 100, &[("10", "1")], &[("11", "2")]));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        state.on_snapshot(depth_ok("ethusdt", 200, &[("20", "1")], &[("21", "2")]));
        match rx.try_recv() {
            Ok(BusEvent::OrderBookOpen(books)) => {
                assert_eq!(books.len(), 2);
                assert_eq!(books["btcusdt"].generation(), 100);
                assert_eq!(books["ethusdt"].generation(), 200);
            }
            other => panic!("expected OrderBookOpen, got {:?}", other),
        }
        // fires exactly once
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn snapshot_failure_publishes_error_and_keeps_the_barrier_closed() {
        let (mut state, mut rx, ready) = test_state(&["btcusdt"]);

        state.on_snapshot(SnapshotResult::Depth {
            symbol: "btcusdt".to_string(),
            outcome: Err(FeedError::Http {
                status: 502,
                body: "bad gateway".to_string(),
            }),
        });

        assert!(matches!(rx.try_recv(), Ok(BusEvent::Error(_))));
        assert_eq!(state.depth_pending, 1);
        assert!(!ready.is_ready());
    }

    #[tokio::test]
    async fn ready_flips_once_all_three_barriers_clear() {
        let (mut state, _rx, ready) = test_state(&["btcusdt", "ethusdt"]);

        for symbol in ["btcusdt", "ethusdt"] {
            state.on_snapshot(depth_ok(symbol, 100, &[("10", "1")], &[("11", "2")]));
            state.on_snapshot(trades_ok(symbol));
            assert!(!ready.is_ready());
            for period in kline::PERIODS {
                state.on_snapshot(klines_ok(symbol, period));
            }
        }
        assert!(ready.is_ready());
    }

    #[tokio::test]
    async fn tradebook_open_carries_the_seeded_tape() {
        let (mut state, mut rx, _ready) = test_state(&["btcusdt"]);

        state.on_snapshot(trades_ok("btcusdt"));
        match rx.try_recv() {
            Ok(BusEvent::TradeBookOpen(tapes)) => {
                let recent = tapes["btcusdt"].fetch(10);
                assert_eq!(recent.len(), 1);
                assert_eq!(recent[0].tid, 1);
                // maker-buyer is labeled a buy, ms are stored as seconds
                assert_eq!(recent[0].side, Side::Buy);
                assert_eq!(recent[0].created_at, 1_700_000_000);
            }
            other => panic!("expected TradeBookOpen, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn kline_open_fires_after_every_period_of_every_symbol() {
        let (mut state, mut rx, _ready) = test_state(&["btcusdt", "ethusdt"]);

        for symbol in ["btcusdt", "ethusdt"] {
            for period in kline::PERIODS {
                assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
                state.on_snapshot(klines_ok(symbol, period));
            }
        }

        match rx.try_recv() {
            Ok(BusEvent::KlineOpen(series)) => {
                let snapshot = series["btcusdt"].snapshot();
                let candles = &snapshot[&1];
                assert_eq!(candles.len(), 1);
                assert_eq!(candles[0].open_time, 1_700_000_000);
                assert_eq!(candles[0].volume, dec("0.1235"));
            }
            other => panic!("expected KlineOpen, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn depth_diff_applies_after_the_snapshot() {
        let (mut state, _rx, _ready) = test_state(&["btcusdt"]);
        state.on_snapshot(depth_ok("btcusdt", 100, &[("10", "1")], &[("11", "2")]));

        let resync = state.on_frame(depth_frame(
            "btcusdt",
            101,
            101,
            json!([["10", "0"]]),
            json!([["12", "3"]]),
        ));
        assert!(resync.is_none());

        let book = &state.books["btcusdt"];
        assert_eq!(book.generation(), 101);
        assert_eq!(book.bid_count(), 0);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), Some(dec("11")));
        assert_eq!(book.ask_volume(&dec("12")), Some(dec("3")));
    }

    #[tokio::test]
    async fn stale_depth_diff_is_dropped() {
        let (mut state, _rx, _ready) = test_state(&["btcusdt"]);
        state.on_snapshot(depth_ok("btcusdt", 200, &[("10", "1")], &[("11", "2")]));

        let resync = state.on_frame(depth_frame(
            "btcusdt",
            199,
            199,
            json!([]),
            json!([["50", "1"]]),
        ));
        assert!(resync.is_none());

        let book = &state.books["btcusdt"];
        assert_eq!(book.generation(), 200);
        assert_eq!(book.ask_volume(&dec("50")), None);
    }

    #[tokio::test]
    async fn sequence_gap_requests_a_resync_once() {
        let (mut state, _rx, _ready) = test_state(&["btcusdt"]);
        state.on_snapshot(depth_ok("btcusdt", 100, &[("10", "1")], &[("11", "2")]));

        let first = state.on_frame(depth_frame("btcusdt", 150, 151, json!([]), json!([["12", "1"]])));
        assert_eq!(first.as_deref(), Some("btcusdt"));
        // book untouched by the gapped diff
        assert_eq!(state.books["btcusdt"].generation(), 100);

        // further gapped diffs while the snapshot is in flight don't re-request
        let second = state.on_frame(depth_frame("btcusdt", 152, 153, json!([]), json!([["13", "1"]])));
        assert!(second.is_none());

        // the fresh snapshot clears the flag and re-arms the gate
        state.on_snapshot(depth_ok("btcusdt", 160, &[("10", "1")], &[("11", "2")]));
        assert_eq!(state.books["btcusdt"].generation(), 160);
        assert!(state.resyncing.is_empty());
    }

    #[tokio::test]
    async fn ticker_frames_are_normalized_and_published() {
        let (mut state, mut rx, _ready) = test_state(&["btcusdt"]);

        state.on_frame(StreamFrame {
            stream: "btcusdt@ticker".to_string(),
            data: json!({
                "e": "24hrTicker",
                "E": 1_700_000_000_000i64,
                "s": "BTCUSDT",
                "P": "-1.250",
                "w": "44000.1",
                "c": "44100.5",
                "o": "44500",
                "h": "45000",
                "l": "43500",
                "b": "44100.4",
                "a": "44100.6",
                "v": "1234.5"
            }),
        });

        match rx.try_recv() {
            Ok(BusEvent::Ticker { symbol, data }) => {
                assert_eq!(symbol, "btcusdt");
                assert_eq!(data.low, dec("43500"));
                assert_eq!(data.high, dec("45000"));
                assert_eq!(data.last, dec("44100.5"));
                assert_eq!(data.sell, dec("44100.6"));
                assert_eq!(data.buy, dec("44100.4"));
                assert_eq!(data.avg_price, dec("44000.1"));
                assert_eq!(data.price_change_percent, "-1.250");
            }
            other => panic!("expected Ticker, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn trade_frames_publish_without_touching_the_tape() {
        let (mut state, mut rx, _ready) = test_state(&["btcusdt"]);
        state.on_snapshot(trades_ok("btcusdt"));
        let _ = rx.try_recv(); // TradeBookOpen

        state.on_frame(StreamFrame {
            stream: "btcusdt@trade".to_string(),
            data: json!({
                "e": "trade",
                "E": 1_700_000_123_456i64,
                "s": "BTCUSDT",
                "t": 42,
                "p": "44100.5",
                "q": "0.25",
                "m": false
            }),
        });

        match rx.try_recv() {
            Ok(BusEvent::Trade { symbol, data }) => {
                assert_eq!(symbol, "btcusdt");
                assert_eq!(data.tid, 42);
                assert_eq!(data.side, Side::Sell);
                assert_eq!(data.date, 1_700_000_123);
                assert_eq!(data.price, dec("44100.5"));
                assert_eq!(data.amount, dec("0.25"));
            }
            other => panic!("expected Trade, got {:?}", other),
        }
        // tape still only holds the seed
        assert_eq!(state.tapes["btcusdt"].len(), 1);
    }

    #[tokio::test]
    async fn kline_frames_publish_normalized_candles_without_appending() {
        let (mut state, mut rx, _ready) = test_state(&["btcusdt"]);

        state.on_frame(StreamFrame {
            stream: "btcusdt@kline_5m".to_string(),
            data: json!({
                "e": "kline",
                "E": 1_700_000_000_000i64,
                "s": "BTCUSDT",
                "k": {
                    "t": 1_700_000_000_000i64,
                    "i": "5m",
                    "o": "10",
                    "h": "11",
                    "l": "9",
                    "c": "10.5",
                    "v": "0.123456"
                }
            }),
        });

        match rx.try_recv() {
            Ok(BusEvent::Kline { symbol, period, data }) => {
                assert_eq!(symbol, "btcusdt");
                assert_eq!(period, 5);
                assert_eq!(data.open_time, 1_700_000_000);
                assert_eq!(data.volume, dec("0.1235"));
            }
            other => panic!("expected Kline, got {:?}", other),
        }
        assert!(state.series["btcusdt"].candles(5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_stream_kinds_are_ignored() {
        let (mut state, mut rx, _ready) = test_state(&["btcusdt"]);
        let resync = state.on_frame(StreamFrame {
            stream: "btcusdt@bookTicker".to_string(),
            data: json!({}),
        });
        assert!(resync.is_none());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn start_rejects_an_empty_markets_list() {
        // the configuration check fails before anything is spawned
        let config = Config::default();
        let client = Arc::new(Client::new(&config).unwrap());
        let mut engine = StreamEngine::new(client, &config);
        assert!(matches!(engine.start(&[]), Err(FeedError::Config(_))));
    }
}
