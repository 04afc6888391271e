//! API Credential Management
//!
//! Secure handling of Binance API credentials loaded from environment variables.
//! Credentials are never logged and are masked when displayed.

use std::fmt;

use crate::error::FeedError;

/// Secure string wrapper that masks sensitive data in logs
///
/// Debug output shows only `SecretString(***)` and Display shows the
/// truncated form `first4...last4`.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: String) -> Self {
        SecretString(value)
    }

    /// Returns the inner string for use in an actual API call.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Masked form safe for logging (`abcd...wxyz`).
    pub fn masked(&self) -> String {
        let s = &self.0;
        if s.len() <= 8 {
            return "***".to_string();
        }
        format!("{}...{}", &s[..4], &s[s.len() - 4..])
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString(***)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        SecretString::new(s)
    }
}

/// Binance API credentials
#[derive(Clone, Debug)]
pub struct Credentials {
    /// API key (public identifier, sent as the `X-MBX-APIKEY` header)
    pub api_key: SecretString,
    /// Secret key (private HMAC signing key)
    pub secret_key: SecretString,
}

impl Credentials {
    /// Loads credentials from `BINANCE_API_KEY` and `BINANCE_SECRET_KEY`.
    ///
    /// Trims whitespace and validates non-empty. A missing or empty variable
    /// surfaces as an authorization failure.
    pub fn from_env() -> Result<Self, FeedError> {
        let api_key = std::env::var("BINANCE_API_KEY").map_err(|_| FeedError::Auth {
            reason: "BINANCE_API_KEY not set".to_string(),
        })?;
        let secret_key = std::env::var("BINANCE_SECRET_KEY").map_err(|_| FeedError::Auth {
            reason: "BINANCE_SECRET_KEY not set".to_string(),
        })?;

        Self::from_parts(api_key, secret_key)
    }

    /// Builds credentials from raw strings, applying the same validation as
    /// the environment path.
    pub fn from_parts(api_key: String, secret_key: String) -> Result<Self, FeedError> {
        let api_key = api_key.trim().to_string();
        let secret_key = secret_key.trim().to_string();

        if api_key.is_empty() {
            return Err(FeedError::Auth {
                reason: "API key is empty".to_string(),
            });
        }
        if secret_key.is_empty() {
            return Err(FeedError::Auth {
                reason: "secret key is empty".to_string(),
            });
        }

        Ok(Self {
            api_key: SecretString::new(api_key),
            secret_key: SecretString::new(secret_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_string_masks_debug_and_display() {
        let secret = SecretString::new("abcdefghijklmnop".to_string());
        assert_eq!(format!("{:?}", secret), "SecretString(***)");
        assert_eq!(format!("{}", secret), "abcd...mnop");
    }

    #[test]
    fn short_secrets_are_fully_masked() {
        let secret = SecretString::new("short".to_string());
        assert_eq!(secret.masked(), "***");
    }

    #[test]
    fn empty_credentials_are_an_auth_error() {
        let err = Credentials::from_parts("  ".into(), "secret".into()).unwrap_err();
        assert_eq!(err.code(), Some(2001));
    }
}
