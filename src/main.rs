use anyhow::{Context, Result};
use clap::Parser;
use rsibot::api::BinanceClient;
use rsibot::config::load_config;
use rsibot::events::TracingSink;
use rsibot::execution::{PaperExchange, PositionManager, TradingLoop, TradingRules};
use rsibot::risk::SpendLedger;
use rsibot::TakeProfitMode;
use rust_decimal_macros::dec;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// RSI mean-reversion bot for a single spot pair (paper trading)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "rsibot.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Trading pair, e.g. BTC/USDT
    #[arg(long)]
    symbol: Option<String>,

    /// Candle timeframe, e.g. 1m
    #[arg(long)]
    timeframe: Option<String>,

    /// Take-profit sizing: full or partial
    #[arg(long)]
    take_profit_mode: Option<TakeProfitMode>,

    /// Seconds between ticks
    #[arg(long)]
    poll_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    setup_logging(&args.log_level);

    tracing::info!("🚀 rsibot starting");

    let mut config = load_config(Some(&args.config)).context("Failed to load configuration")?;
    if let Some(symbol) = args.symbol {
        config.symbol = symbol;
    }
    if let Some(timeframe) = args.timeframe {
        config.timeframe = timeframe;
    }
    if let Some(mode) = args.take_profit_mode {
        config.take_profit_mode = mode;
    }
    if let Some(secs) = args.poll_interval {
        config.poll_interval_secs = secs;
    }
    config.validate().context("Invalid configuration")?;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} ({})", config.symbol, config.timeframe);
    tracing::info!(
        "  RSI({}) buy below {}",
        config.rsi_period,
        config.rsi_buy_threshold
    );
    tracing::info!(
        "  Stop-loss: {}%  Take-profit: {}% ({:?})",
        config.stop_loss_pct * dec!(100),
        config.take_profit_pct * dec!(100),
        config.take_profit_mode
    );
    tracing::info!(
        "  Trade size: ${}  Daily cap: ${}",
        config.trade_amount_usdt,
        config.daily_spend_cap
    );

    let client = BinanceClient::with_base_url(config.exchange_base_url.clone())
        .context("Failed to build market data client")?;
    let exchange = PaperExchange::new(client, config.paper_balance_usdt, config.min_order_qty);

    let position_manager = PositionManager::new(TradingRules::from(&config));
    let mut trading_loop = TradingLoop::new(
        config,
        exchange,
        position_manager,
        SpendLedger::new(),
        Box::new(TracingSink),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!("\nPress Ctrl+C to stop...\n");
    trading_loop.run(shutdown_rx).await;

    let balances = trading_loop.exchange().balances()?;
    tracing::info!(
        "💼 Paper account: {:.2} USDT, {} base",
        balances.quote,
        balances.base
    );
    Ok(())
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rsibot={}", level.to_lowercase())));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
