//! Binance WebSocket transport
//!
//! Builds the combined-stream URL and opens the single connection the stream
//! engine multiplexes. One socket carries every subscribed stream; frames
//! arrive wrapped as `{"stream": name, "data": payload}`.
//!
//! There is deliberately no reconnect loop here: connection loss surfaces as
//! an `error` event and a supervisor restarts the engine, which rebuilds the
//! books from fresh snapshots.

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::FeedError;
use crate::market::kline;

/// Stream kinds every market subscribes to, besides the per-period klines.
const MARKET_STREAM_KINDS: [&str; 3] = ["depth", "ticker", "trade"];

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the combined-stream URL for a set of markets.
///
/// The `streams=` query is the '/'-joined cross-product of
/// `markets x ({depth, ticker, trade} + {kline_<label> per period})`,
/// all lowercase.
pub fn combined_stream_url(ws_endpoint: &str, markets: &[String]) -> String {
    let mut streams = Vec::with_capacity(markets.len() * (MARKET_STREAM_KINDS.len() + kline::PERIODS.len()));
    for market in markets {
        let market = market.to_lowercase();
        for kind in MARKET_STREAM_KINDS {
            streams.push(format!("{}@{}", market, kind));
        }
        for period in kline::PERIODS {
            // Infallible: PERIODS only holds recognized periods.
            if let Ok(label) = kline::interval_label(period) {
                streams.push(format!("{}@kline_{}", market, label));
            }
        }
    }

    format!("{}/stream?streams={}", ws_endpoint, streams.join("/"))
}

/// Opens the combined stream for the given markets.
pub async fn connect_combined(ws_endpoint: &str, markets: &[String]) -> Result<WsStream, FeedError> {
    let url = combined_stream_url(ws_endpoint, markets);
    tracing::info!(url = %url, "connecting to combined stream");

    let (stream, _) = connect_async(url.as_str()).await?;
    tracing::info!(markets = markets.len(), "combined stream connected");
    Ok(stream)
}
