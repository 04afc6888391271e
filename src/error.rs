use thiserror::Error;

/// Taxonomy code attached to every authorization failure.
pub const AUTH_ERROR_CODE: u16 = 2001;

/// Main error type for the upstream feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("authorization failed (code 2001): {reason}")]
    Auth { reason: String },
}

impl FeedError {
    /// Numeric taxonomy code, present only on coded variants.
    pub fn code(&self) -> Option<u16> {
        match self {
            FeedError::Auth { .. } => Some(AUTH_ERROR_CODE),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Connection("request timed out".to_string())
        } else if err.is_connect() {
            FeedError::Connection(format!("failed to connect to upstream: {}", err))
        } else if err.is_decode() {
            FeedError::Parse(err.to_string())
        } else {
            FeedError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_carry_the_taxonomy_code() {
        let err = FeedError::Auth {
            reason: "signature mismatch".to_string(),
        };
        assert_eq!(err.code(), Some(2001));
        assert!(err.to_string().contains("2001"));
        assert!(err.to_string().contains("signature mismatch"));
    }

    #[test]
    fn other_errors_have_no_code() {
        assert_eq!(FeedError::Config("empty markets".into()).code(), None);
        let err = FeedError::Http {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.code(), None);
    }
}
