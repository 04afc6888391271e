//! Configuration Management
//!
//! Endpoints, request timeout, and API credentials for the upstream feed.

pub mod credentials;

use std::time::Duration;

// Re-export
pub use credentials::{Credentials, SecretString};

/// Default Binance REST endpoint
const DEFAULT_REST_ENDPOINT: &str = "https://api.binance.com";

/// Default Binance WebSocket endpoint (combined streams live under /stream)
const DEFAULT_WS_ENDPOINT: &str = "wss://stream.binance.com:9443";

/// Upstream feed configuration
///
/// Credentials are optional: market-data streaming works without them,
/// order submission does not.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL for REST requests
    pub rest_endpoint: String,
    /// Base URL for WebSocket streams
    pub ws_endpoint: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Optional signing credentials
    pub credentials: Option<Credentials>,
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// `BINANCE_REST_ENDPOINT` / `BINANCE_WS_ENDPOINT` override the public
    /// endpoints. Credentials are picked up when both `BINANCE_API_KEY` and
    /// `BINANCE_SECRET_KEY` are set; otherwise the feed runs unauthenticated.
    pub fn from_env() -> Self {
        let rest_endpoint = std::env::var("BINANCE_REST_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_REST_ENDPOINT.to_string());
        let ws_endpoint = std::env::var("BINANCE_WS_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_WS_ENDPOINT.to_string());

        Self {
            rest_endpoint,
            ws_endpoint,
            request_timeout: Duration::from_secs(10),
            credentials: Credentials::from_env().ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rest_endpoint: DEFAULT_REST_ENDPOINT.to_string(),
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(10),
            credentials: None,
        }
    }
}
