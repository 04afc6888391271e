//! Binance HTTP Client
//!
//! Thin transport over the Binance REST API: snapshot GETs for the stream
//! engine and the signed order POST for the trader. Request signing uses
//! HMAC-SHA256 over the query string, hex-encoded, with the API key sent as
//! the `X-MBX-APIKEY` header.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::binance::types::{DepthSnapshot, OrderAck, RecentTrade};
use crate::config::Config;
use crate::error::FeedError;
use crate::trader::OrderRequest;

type HmacSha256 = Hmac<Sha256>;

/// Binance REST API client
///
/// Shared read-only by the stream engine and the trader; every request
/// produces an independent result.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    rest_endpoint: String,
    credentials: Option<crate::config::Credentials>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("rest_endpoint", &self.rest_endpoint)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl Client {
    pub fn new(config: &Config) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("binance-feed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            rest_endpoint: config.rest_endpoint.clone(),
            credentials: config.credentials.clone(),
        })
    }

    /// Full depth snapshot for one symbol.
    ///
    /// Calls GET /api/v3/depth. The snapshot's `lastUpdateId` is the
    /// generation the order book is committed at.
    pub async fn depth(&self, symbol: &str) -> Result<DepthSnapshot, FeedError> {
        let url = format!(
            "{}/api/v3/depth?symbol={}",
            self.rest_endpoint,
            symbol.to_uppercase()
        );
        let response = self.http.get(&url).send().await?;
        let response = expect_success(response).await?;
        Ok(response.json::<DepthSnapshot>().await?)
    }

    /// Most recent public trades for one symbol.
    ///
    /// Calls GET /api/v3/trades.
    pub async fn recent_trades(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<RecentTrade>, FeedError> {
        let url = format!(
            "{}/api/v3/trades?symbol={}&limit={}",
            self.rest_endpoint,
            symbol.to_uppercase(),
            limit
        );
        let response = self.http.get(&url).send().await?;
        let response = expect_success(response).await?;
        Ok(response.json::<Vec<RecentTrade>>().await?)
    }

    /// Candle history for one symbol and interval label (e.g. "5m").
    ///
    /// Calls GET /api/v3/klines. Rows come back as raw JSON arrays; the
    /// caller keeps the first six columns.
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Vec<serde_json::Value>, FeedError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}",
            self.rest_endpoint,
            symbol.to_uppercase(),
            interval
        );
        let response = self.http.get(&url).send().await?;
        let response = expect_success(response).await?;
        Ok(response.json::<Vec<serde_json::Value>>().await?)
    }

    /// Submits an order.
    ///
    /// Calls POST /api/v3/order with a signed query string. Requires
    /// credentials; without them this is an authorization failure before any
    /// request is made.
    pub async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, FeedError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| FeedError::Auth {
            reason: "API credentials not configured".to_string(),
        })?;

        let mut params = vec![
            format!("symbol={}", order.symbol.to_uppercase()),
            format!("side={}", order.side.as_str()),
            format!("type={}", order.order_type.as_str()),
            format!("quantity={}", order.quantity),
            format!("timestamp={}", Utc::now().timestamp_millis()),
        ];
        if let Some(price) = order.price {
            params.push(format!("price={}", price));
            params.push("timeInForce=GTC".to_string());
        }

        let query = params.join("&");
        let signature = sign_query(credentials.secret_key.expose_secret(), &query)?;
        let url = format!(
            "{}/api/v3/order?{}&signature={}",
            self.rest_endpoint, query, signature
        );

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", credentials.api_key.expose_secret())
            .send()
            .await?;
        let response = expect_success(response).await?;
        Ok(response.json::<OrderAck>().await?)
    }
}

/// HMAC-SHA256 signature over a query string, hex-encoded.
fn sign_query(secret: &str, query: &str) -> Result<String, FeedError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| FeedError::Auth {
        reason: format!("invalid secret key: {}", e),
    })?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Maps non-2xx responses into the error taxonomy, reading the body for the
/// reason. 401/403 are authorization failures; everything else ≥ 300 is an
/// upstream HTTP error.
async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Err(FeedError::Auth {
            reason: format!("HTTP {}: {}", status.as_u16(), body),
        })
    } else {
        Err(FeedError::Http {
            status: status.as_u16(),
            body,
        })
    }
}
