// Bot configuration
// Loaded once at start-up and immutable afterwards.
// Priority (highest to lowest):
// 1. CLI flags (applied by the binary)
// 2. Environment variables (prefixed with `RSIBOT__`)
// 3. Configuration file (TOML format)
// 4. Default values

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::api::binance::MAX_KLINES;
use crate::{BotError, Result};

/// How a take-profit exit is sized
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TakeProfitMode {
    /// Sell the whole remaining position
    Full,
    /// Sell `trade_amount_usdt * take_profit_pct` worth of base asset
    #[default]
    Partial,
}

impl std::str::FromStr for TakeProfitMode {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(TakeProfitMode::Full),
            "partial" => Ok(TakeProfitMode::Partial),
            other => Err(BotError::Configuration(format!(
                "unknown take-profit mode '{}', expected 'full' or 'partial'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    /// Trading pair, e.g. `BTC/USDT`
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Candle timeframe, e.g. `1m`
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    /// Enter when RSI drops below this
    #[serde(default = "default_rsi_buy_threshold")]
    pub rsi_buy_threshold: Decimal,
    /// Fraction below entry that triggers the stop-loss
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Fraction above entry that triggers the take-profit
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    #[serde(default)]
    pub take_profit_mode: TakeProfitMode,
    /// Quote-currency notional of each entry
    #[serde(default = "default_trade_amount_usdt")]
    pub trade_amount_usdt: Decimal,
    /// Maximum entry notional over a trailing 24h window
    #[serde(default = "default_daily_spend_cap")]
    pub daily_spend_cap: Decimal,
    /// Smallest base-asset quantity the exchange accepts
    #[serde(default = "default_min_order_qty")]
    pub min_order_qty: Decimal,
    /// Candles requested per tick
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wait after a failed tick
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_exchange_base_url")]
    pub exchange_base_url: String,
    /// Starting quote balance of the paper account
    #[serde(default = "default_paper_balance_usdt")]
    pub paper_balance_usdt: Decimal,
}

fn default_symbol() -> String {
    "BTC/USDT".to_string()
}

fn default_timeframe() -> String {
    "1m".to_string()
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_buy_threshold() -> Decimal {
    dec!(30)
}

fn default_stop_loss_pct() -> Decimal {
    dec!(0.10)
}

fn default_take_profit_pct() -> Decimal {
    dec!(0.05)
}

fn default_trade_amount_usdt() -> Decimal {
    dec!(100)
}

fn default_daily_spend_cap() -> Decimal {
    dec!(1000)
}

fn default_min_order_qty() -> Decimal {
    dec!(0.00001)
}

fn default_candle_limit() -> usize {
    100
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_error_backoff_secs() -> u64 {
    10
}

fn default_exchange_base_url() -> String {
    "https://api.binance.us".to_string()
}

fn default_paper_balance_usdt() -> Decimal {
    dec!(10000)
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            timeframe: default_timeframe(),
            rsi_period: default_rsi_period(),
            rsi_buy_threshold: default_rsi_buy_threshold(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            take_profit_mode: TakeProfitMode::default(),
            trade_amount_usdt: default_trade_amount_usdt(),
            daily_spend_cap: default_daily_spend_cap(),
            min_order_qty: default_min_order_qty(),
            candle_limit: default_candle_limit(),
            poll_interval_secs: default_poll_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            exchange_base_url: default_exchange_base_url(),
            paper_balance_usdt: default_paper_balance_usdt(),
        }
    }
}

impl BotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// Reject values the decision engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(BotError::Configuration(msg));

        if self.symbol.trim().is_empty() {
            return fail("symbol must not be empty".into());
        }
        if self.rsi_period == 0 {
            return fail("rsi_period must be at least 1".into());
        }
        if self.rsi_buy_threshold <= Decimal::ZERO || self.rsi_buy_threshold > dec!(100) {
            return fail(format!(
                "rsi_buy_threshold must be in (0, 100], got {}",
                self.rsi_buy_threshold
            ));
        }
        if self.stop_loss_pct <= Decimal::ZERO || self.stop_loss_pct >= Decimal::ONE {
            return fail(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                self.stop_loss_pct
            ));
        }
        if self.take_profit_pct <= Decimal::ZERO {
            return fail(format!(
                "take_profit_pct must be positive, got {}",
                self.take_profit_pct
            ));
        }
        if self.trade_amount_usdt <= Decimal::ZERO {
            return fail(format!(
                "trade_amount_usdt must be positive, got {}",
                self.trade_amount_usdt
            ));
        }
        if self.daily_spend_cap < self.trade_amount_usdt {
            return fail(format!(
                "daily_spend_cap ({}) is below trade_amount_usdt ({}), no entry could ever happen",
                self.daily_spend_cap, self.trade_amount_usdt
            ));
        }
        if self.min_order_qty < Decimal::ZERO {
            return fail("min_order_qty must not be negative".into());
        }
        if self.candle_limit > MAX_KLINES {
            return fail(format!(
                "candle_limit ({}) exceeds the {} candles one klines request returns",
                self.candle_limit, MAX_KLINES
            ));
        }
        if self.candle_limit < self.rsi_period + 1 {
            return fail(format!(
                "candle_limit ({}) must be at least rsi_period + 1 ({})",
                self.candle_limit,
                self.rsi_period + 1
            ));
        }
        if self.poll_interval_secs == 0 {
            return fail("poll_interval_secs must be positive".into());
        }
        if self.paper_balance_usdt < Decimal::ZERO {
            return fail("paper_balance_usdt must not be negative".into());
        }

        Ok(())
    }
}

/// Load configuration from an optional TOML file and `RSIBOT__*` env vars
pub fn load_config(config_path: Option<&str>) -> Result<BotConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        } else {
            tracing::warn!("Config file {} not found, using defaults and environment", path);
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("RSIBOT")
            .separator("__")
            .try_parsing(true),
    );

    let config: BotConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
