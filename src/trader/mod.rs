//! Trader
//!
//! Order submission gated on upstream readiness. `order` returns a [`Trade`]
//! handle immediately; the actual POST runs in a background task that first
//! waits for the ready gate, so orders placed before the feed finished
//! loading are held back rather than rejected. Each handle publishes its
//! lifecycle to subscribers and dies when the caller drops it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::broadcast;

use crate::binance::Client;
use crate::engine::ReadyGate;
use crate::error::FeedError;
use crate::market::Side;

/// Order kind accepted upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

/// An order as the caller describes it
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: Decimal,
    /// Required for limit orders; priced orders are submitted GTC
    pub price: Option<Decimal>,
}

/// Lifecycle events of one in-flight order
#[derive(Debug, Clone)]
pub enum TradeEvent {
    /// Upstream accepted the order and assigned this id
    Submitted(i64),
    /// Submission failed; carries the request that failed
    Failed(OrderRequest),
}

/// Handle for one submitted order
///
/// Subscribers registered through [`subscribe`](Self::subscribe) receive the
/// order's lifecycle events. The first subscription is created together with
/// the handle, before the submit task starts, so the earliest event cannot
/// be missed.
pub struct Trade {
    request: OrderRequest,
    events: broadcast::Sender<TradeEvent>,
    first: Mutex<Option<broadcast::Receiver<TradeEvent>>>,
}

impl Trade {
    pub fn request(&self) -> &OrderRequest {
        &self.request
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        match self.first.lock() {
            Ok(mut slot) => slot
                .take()
                .unwrap_or_else(|| self.events.subscribe()),
            Err(_) => self.events.subscribe(),
        }
    }
}

/// Order submission front end
///
/// Shares the REST client with the engine and defers every submission until
/// the readiness gate flips.
pub struct Trader {
    client: Arc<Client>,
    ready: ReadyGate,
}

impl Trader {
    pub fn new(client: Arc<Client>, ready: ReadyGate) -> Self {
        Self { client, ready }
    }

    /// Submits an order, now or once the upstream becomes ready.
    ///
    /// The handle is returned immediately. When `timeout` is set it bounds
    /// the whole submission, ready-wait included; on expiry the handle
    /// receives `Failed` with the original request.
    pub fn order(&self, timeout: Option<Duration>, request: OrderRequest) -> Trade {
        let (events, first) = broadcast::channel(8);
        let trade = Trade {
            request: request.clone(),
            events: events.clone(),
            first: Mutex::new(Some(first)),
        };

        let client = self.client.clone();
        let ready = self.ready.clone();
        tokio::spawn(async move {
            let submit = async {
                ready.wait().await;
                client.submit_order(&request).await
            };
            let outcome = match timeout {
                Some(deadline) => match tokio::time::timeout(deadline, submit).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FeedError::Connection(format!(
                        "order submission timed out after {:?}",
                        deadline
                    ))),
                },
                None => submit.await,
            };

            match outcome {
                Ok(ack) => {
                    tracing::info!(
                        order_id = ack.order_id,
                        symbol = %request.symbol,
                        side = %request.side,
                        "order submitted"
                    );
                    let _ = events.send(TradeEvent::Submitted(ack.order_id));
                }
                Err(e) => {
                    tracing::warn!(symbol = %request.symbol, error = %e, "order submission failed");
                    let _ = events.send(TradeEvent::Failed(request));
                }
            }
        });

        trade
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn request() -> OrderRequest {
        OrderRequest {
            symbol: "btcusdt".to_string(),
            order_type: OrderType::Limit,
            side: Side::Buy,
            quantity: Decimal::from_str("0.5").unwrap(),
            price: Some(Decimal::from_str("40000").unwrap()),
        }
    }

    #[test]
    fn order_type_wire_forms() {
        assert_eq!(OrderType::Limit.as_str(), "LIMIT");
        assert_eq!(OrderType::Market.as_str(), "MARKET");
    }

    #[tokio::test]
    async fn first_subscriber_sees_events_sent_before_it_polled() {
        let (events, first) = broadcast::channel(8);
        let trade = Trade {
            request: request(),
            events: events.clone(),
            first: Mutex::new(Some(first)),
        };

        // event fires before anyone called subscribe
        events.send(TradeEvent::Submitted(7)).unwrap();

        let mut rx = trade.subscribe();
        assert!(matches!(rx.recv().await, Ok(TradeEvent::Submitted(7))));

        // later subscribers only see what comes after them
        let mut late = trade.subscribe();
        events.send(TradeEvent::Submitted(8)).unwrap();
        assert!(matches!(late.recv().await, Ok(TradeEvent::Submitted(8))));
    }
}
