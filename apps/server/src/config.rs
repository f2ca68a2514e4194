//! Application configuration.

use std::time::Duration;
use thiserror::Error;

/// Default Etherscan API endpoint.
pub const DEFAULT_ETHERSCAN_URL: &str = "https://api.etherscan.io/api";

/// Default SQLite database location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://gas_db.sqlite";

/// Environment variables that must be present at startup.
const REQUIRED_VARS: [&str; 2] = ["TELEGRAM_TOKEN", "ETHERSCAN_API"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("Invalid URL in {name}: {reason}")]
    InvalidUrl { name: &'static str, reason: String },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Timing of one periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Delay before the first run.
    pub first_delay: Duration,
    /// Time between runs.
    pub period: Duration,
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Telegram bot token.
    pub telegram_token: String,
    /// Etherscan API key.
    pub etherscan_api_key: String,
    /// Etherscan API endpoint.
    pub etherscan_url: String,
    /// SQLite URL for subscriptions.
    pub database_url: String,
    /// Gas price polling schedule.
    pub poll: Schedule,
    /// Alert dispatch schedule.
    pub dispatch: Schedule,
    /// Timeout for each oracle request.
    pub fetch_timeout: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("telegram_token", &"<redacted>")
            .field("etherscan_api_key", &"<redacted>")
            .field("etherscan_url", &self.etherscan_url)
            .field("database_url", &self.database_url)
            .field("poll", &self.poll)
            .field("dispatch", &self.dispatch)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Every missing required variable is reported at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<&'static str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| get(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let config = Self {
            telegram_token: get("TELEGRAM_TOKEN").unwrap_or_default(),
            etherscan_api_key: get("ETHERSCAN_API").unwrap_or_default(),
            etherscan_url: get("ETHERSCAN_URL").unwrap_or_else(|| DEFAULT_ETHERSCAN_URL.to_string()),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            poll: Schedule {
                first_delay: Duration::from_secs(1),
                period: Duration::from_secs(12),
            },
            dispatch: Schedule {
                first_delay: Duration::from_secs(2),
                period: Duration::from_secs(60),
            },
            fetch_timeout: Duration::from_secs(10),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that can't be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.etherscan_url).map_err(|e| ConfigError::InvalidUrl {
            name: "ETHERSCAN_URL",
            reason: e.to_string(),
        })?;

        if !self.database_url.starts_with("sqlite:") {
            return Err(ConfigError::InvalidUrl {
                name: "DATABASE_URL",
                reason: "expected a sqlite: URL".to_string(),
            });
        }

        if self.poll.period.is_zero() {
            return Err(ConfigError::ZeroDuration("poll interval"));
        }
        if self.dispatch.period.is_zero() {
            return Err(ConfigError::ZeroDuration("dispatch interval"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("fetch timeout"));
        }

        Ok(())
    }
}
