//! Binance transport layer
//!
//! REST client, WebSocket connector, and the wire types both speak.

pub mod client;
pub mod types;
pub mod websocket;

// Re-export commonly used types
pub use client::Client;
pub use types::{
    DepthDiff, DepthSnapshot, KlineEvent, OrderAck, RecentTrade, StreamFrame, TickerEvent,
    TradeEvent,
};
