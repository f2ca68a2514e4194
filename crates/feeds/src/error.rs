//! Error types for oracle fetches.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching from the gas oracle.
///
/// Every variant is transient from the poller's point of view: the cycle is
/// skipped and the previous snapshot stays visible.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Oracle returned an error: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else if let Some(status) = err.status() {
            FeedError::Status(status.as_u16())
        } else {
            FeedError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Short label for logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Http(_) => "http",
            FeedError::Status(_) => "status",
            FeedError::Timeout(_) => "timeout",
            FeedError::ParseError(_) => "parse",
            FeedError::Upstream(_) => "upstream",
        }
    }
}
