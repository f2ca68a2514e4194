//! Gas oracle REST client.
//!
//! Two read-only Etherscan endpoints feed the poller:
//! - `module=gastracker&action=gasoracle` for the slow/average/fast tiers
//! - `module=stats&action=ethprice` for the ETH/USD price

use crate::error::FeedError;
use async_trait::async_trait;
use gasalert_core::FeeRates;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Source of raw gas prices.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Fetch the current fee rates in gwei.
    async fn fetch_fee_tiers(&self) -> Result<FeeRates, FeedError>;

    /// Fetch the current ETH price in USD.
    async fn fetch_usd_price(&self) -> Result<f64, FeedError>;
}

/// Configuration for [`EtherscanClient`].
#[derive(Debug, Clone)]
pub struct EtherscanConfig {
    /// API endpoint, e.g. `https://api.etherscan.io/api`.
    pub base_url: String,
    /// Etherscan API key.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl EtherscanConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.etherscan.io/api";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Etherscan implementation of [`PriceOracle`].
pub struct EtherscanClient {
    http: reqwest::Client,
    config: EtherscanConfig,
}

impl EtherscanClient {
    /// Create a client; the HTTP timeout comes from the config.
    pub fn new(config: EtherscanConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Call an Etherscan module/action and return the raw JSON body.
    async fn get_json(&self, module: &str, action: &str) -> Result<Value, FeedError> {
        let response = self
            .http
            .get(&self.config.base_url)
            .query(&[
                ("module", module),
                ("action", action),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            debug!("Etherscan: {}/{} HTTP {}", module, action, response.status());
            return Err(FeedError::Status(response.status().as_u16()));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        Ok(body)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> FeedError {
        if err.is_timeout() {
            FeedError::Timeout(self.config.timeout)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl PriceOracle for EtherscanClient {
    async fn fetch_fee_tiers(&self) -> Result<FeeRates, FeedError> {
        let body = self.get_json("gastracker", "gasoracle").await?;
        parse_gas_oracle(&body)
    }

    async fn fetch_usd_price(&self) -> Result<f64, FeedError> {
        let body = self.get_json("stats", "ethprice").await?;
        parse_eth_price(&body)
    }
}

/// Unwrap the `{"status", "message", "result"}` envelope.
fn unwrap_result(body: &Value) -> Result<&serde_json::Map<String, Value>, FeedError> {
    if body["status"].as_str() == Some("0") {
        let reason = body["result"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown error");
        return Err(FeedError::Upstream(reason.to_string()));
    }

    body["result"]
        .as_object()
        .ok_or_else(|| FeedError::ParseError("missing result object".to_string()))
}

/// Read a numeric field that may be encoded as a string or a number.
fn number_field(result: &serde_json::Map<String, Value>, field: &str) -> Result<f64, FeedError> {
    let value = match result.get(field) {
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    };

    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| FeedError::ParseError(format!("invalid or missing field {field}")))
}

/// Read a gas price in gwei, rounding fractional values to the nearest integer.
fn gwei_field(result: &serde_json::Map<String, Value>, field: &str) -> Result<u64, FeedError> {
    let value = number_field(result, field)?;
    if value < 0.0 {
        return Err(FeedError::ParseError(format!("negative gas price in {field}")));
    }
    Ok(value.round() as u64)
}

/// Parse a `gasoracle` response body.
pub fn parse_gas_oracle(body: &Value) -> Result<FeeRates, FeedError> {
    let result = unwrap_result(body)?;
    Ok(FeeRates::new(
        gwei_field(result, "SafeGasPrice")?,
        gwei_field(result, "ProposeGasPrice")?,
        gwei_field(result, "FastGasPrice")?,
    ))
}

/// Parse an `ethprice` response body.
pub fn parse_eth_price(body: &Value) -> Result<f64, FeedError> {
    let result = unwrap_result(body)?;
    let price = number_field(result, "ethusd")?;
    if price <= 0.0 {
        return Err(FeedError::ParseError(format!("non-positive ETH price {price}")));
    }
    Ok(price)
}
