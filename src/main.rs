use std::sync::Arc;

use tokio::sync::broadcast;

use binance_feed::{BusEvent, Client, Config, StreamEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut markets: Vec<String> = std::env::args().skip(1).collect();
    if markets.is_empty() {
        markets.push("btcusdt".to_string());
    }

    let config = Config::from_env();
    let client = Arc::new(Client::new(&config)?);
    let mut engine = StreamEngine::new(client, &config);
    let mut events = engine.bus().subscribe();
    engine.start(&markets)?;
    tracing::info!(markets = ?markets, "feed started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    engine.stop().await;
    Ok(())
}

fn log_event(event: &BusEvent) {
    match event {
        BusEvent::OrderBookOpen(books) => {
            tracing::info!(symbols = books.len(), "order books ready");
        }
        BusEvent::TradeBookOpen(tapes) => {
            tracing::info!(symbols = tapes.len(), "trade tapes ready");
        }
        BusEvent::KlineOpen(series) => {
            tracing::info!(symbols = series.len(), "kline series ready");
        }
        BusEvent::Ticker { symbol, data } => {
            tracing::info!(%symbol, last = %data.last, change = %data.price_change_percent, "ticker");
        }
        BusEvent::Trade { symbol, data } => {
            tracing::info!(%symbol, tid = data.tid, side = %data.side, price = %data.price, amount = %data.amount, "trade");
        }
        BusEvent::Kline { symbol, period, data } => {
            tracing::info!(%symbol, period, close = %data.close, "kline");
        }
        BusEvent::Error(message) => {
            tracing::error!(%message, "upstream error");
        }
    }
}
