use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::models::PriceSample;
use crate::{BotError, Result};

// Binance spot REST API (public market data only)
// Docs: https://docs.binance.us/#market-data-endpoints
pub const BINANCE_API_BASE: &str = "https://api.binance.us";
const RATE_LIMIT_RPM: NonZeroU32 = match NonZeroU32::new(600) {
    Some(n) => n,
    None => panic!("rate limit must be non-zero"),
};
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
/// Binance serves at most this many candles per klines request
pub const MAX_KLINES: usize = 1000;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for Binance public market data
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    max_retries: u32,
    initial_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[allow(dead_code)]
    code: i64,
    msg: String,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BotError::Connectivity(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(RATE_LIMIT_RPM))),
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the retry policy (at least one attempt is always made)
    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.initial_backoff = initial_backoff;
        self
    }

    /// `BTC/USDT` → `BTCUSDT`
    pub fn market_symbol(symbol: &str) -> String {
        symbol
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase()
    }

    /// Fetch recent candles and keep their closes, oldest first
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<PriceSample>> {
        let limit = limit.clamp(1, MAX_KLINES);
        let query = [
            ("symbol", Self::market_symbol(symbol)),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];

        let rows: Vec<Vec<serde_json::Value>> =
            self.get("/api/v3/klines", &query).await?.json().await?;

        let mut samples = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>>>()?;
        samples.sort_by_key(|s| s.timestamp);

        tracing::debug!(symbol, interval, candles = samples.len(), "Fetched klines");
        Ok(samples)
    }

    /// Latest traded price
    pub async fn get_ticker_price(&self, symbol: &str) -> Result<Decimal> {
        let query = [("symbol", Self::market_symbol(symbol))];
        let ticker: TickerPrice = self
            .get("/api/v3/ticker/price", &query)
            .await?
            .json()
            .await?;

        parse_decimal(&ticker.price, "ticker price")
    }

    /// Exponential backoff after the given failed attempt (1-based)
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Rate-limited GET with retry on 429, 5xx and network errors
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            self.rate_limiter.until_ready().await;

            let retryable = match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        BotError::Connectivity(format!("Binance returned {} for {}", status, path))
                    } else {
                        // Other 4xx: the request itself is wrong, retrying won't help
                        let body = response.text().await.unwrap_or_default();
                        let message = serde_json::from_str::<ApiError>(&body)
                            .map(|e| e.msg)
                            .unwrap_or(body);
                        return Err(BotError::InvalidResponse(format!(
                            "Binance API error ({}): {}",
                            status, message
                        )));
                    }
                }
                Err(e) => BotError::from(e),
            };

            if attempt < self.max_retries {
                let backoff = self.backoff_for(attempt);
                tracing::warn!(
                    "Attempt {}/{} failed for {}: {}. Retrying in {:?}...",
                    attempt,
                    self.max_retries,
                    path,
                    retryable,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }
            last_error = Some(retryable);
        }

        Err(last_error.unwrap_or_else(|| {
            BotError::Connectivity(format!("All retry attempts failed for {}", path))
        }))
    }
}

fn parse_kline(row: &[serde_json::Value]) -> Result<PriceSample> {
    let open_time = row
        .first()
        .and_then(serde_json::Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| BotError::InvalidResponse("kline without open time".into()))?;
    let close = row
        .get(4)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| BotError::InvalidResponse("kline without close price".into()))?;

    Ok(PriceSample::new(open_time, parse_decimal(close, "close price")?))
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| BotError::InvalidResponse(format!("bad {} '{}': {}", what, raw, e)))
}
