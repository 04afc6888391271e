//! Upstream market-data client for Binance
//!
//! For each configured symbol the stream engine keeps three synchronized
//! views, fused from one-shot REST snapshots and a single combined
//! WebSocket: a depth-accurate order book, a rolling trade tape, and
//! candlestick series over the recognized period set. Normalized updates
//! fan out on an event bus, and a trader submits orders once the feed
//! signals readiness.

pub mod binance;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod trader;

// Re-export the surface most consumers wire together
pub use binance::Client;
pub use config::Config;
pub use engine::{BusEvent, EventBus, ReadyGate, StreamEngine};
pub use error::FeedError;
pub use trader::{OrderRequest, OrderType, Trade, Trader};
