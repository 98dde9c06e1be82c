use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::config::BotConfig;
use crate::error::ErrorKind;
use crate::events::{EventSink, TradeEvent};
use crate::execution::{
    Exchange, ExecutionAction, ExecutionDecision, ExecutionOutcome, Executor, PositionManager,
};
use crate::indicators::calculate_rsi;
use crate::models::closes;
use crate::risk::SpendLedger;
use crate::{BotError, Result};

/// Everything one successful tick observed and did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub rsi: Decimal,
    pub decision: ExecutionDecision,
    pub outcome: ExecutionOutcome,
}

/// Periodic fetch → signal → decide → execute cycle
///
/// Owns the position and the spend ledger; it is their only writer.
pub struct TradingLoop<E: Exchange> {
    config: BotConfig,
    exchange: E,
    executor: Executor,
    position_manager: PositionManager,
    ledger: SpendLedger,
    sink: Box<dyn EventSink>,
}

impl<E: Exchange> TradingLoop<E> {
    pub fn new(
        config: BotConfig,
        exchange: E,
        position_manager: PositionManager,
        ledger: SpendLedger,
        sink: Box<dyn EventSink>,
    ) -> Self {
        let executor = Executor::new(config.symbol.clone());
        Self {
            config,
            exchange,
            executor,
            position_manager,
            ledger,
            sink,
        }
    }

    pub fn position_manager(&self) -> &PositionManager {
        &self.position_manager
    }

    pub fn ledger(&self) -> &SpendLedger {
        &self.ledger
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// Run a single tick at `now`
    ///
    /// Position and ledger only change after a confirmed fill, so any error
    /// returned here leaves them as they were before the call.
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let symbol = self.config.symbol.as_str();

        let price = self.exchange.fetch_current_price(symbol).await?;
        if price <= Decimal::ZERO {
            return Err(BotError::InvalidResponse(format!(
                "non-positive price {} for {}",
                price, symbol
            )));
        }

        let samples = self
            .exchange
            .fetch_recent_closes(symbol, &self.config.timeframe, self.config.candle_limit)
            .await?;
        let rsi = calculate_rsi(&closes(&samples), self.config.rsi_period)?;
        let spent_24h = self.ledger.total_spent(now);

        self.sink.emit(&TradeEvent::Tick {
            timestamp: now,
            price,
            rsi,
            state: self.position_manager.position().state(),
        });
        tracing::info!("📊 24hr Spend Total: ${:.2}", spent_24h);

        let decision = self.position_manager.decide(price, rsi, spent_24h);
        match decision.action {
            ExecutionAction::Skip if self.position_manager.position().is_long() => {
                tracing::info!("⏳ {}", decision.reason)
            }
            ExecutionAction::Skip => tracing::info!("⏸ {}", decision.reason),
            _ => tracing::info!("  Decision: {:?} - {}", decision.action, decision.reason),
        }

        let outcome = self
            .executor
            .execute(
                &self.exchange,
                &decision,
                price,
                now,
                &mut self.position_manager,
                &mut self.ledger,
            )
            .await?;

        self.emit_outcome(&outcome, now);

        Ok(TickReport {
            timestamp: now,
            price,
            rsi,
            decision,
            outcome,
        })
    }

    /// Tick until `shutdown` flips to true
    ///
    /// Failed ticks are logged and retried after the error backoff; nothing
    /// inside a tick can end the loop.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "🚀 Starting RSI bot on {} ({}) via {}: stop-loss {}%, take-profit {}% ({:?}), 24h cap ${}",
            self.config.symbol,
            self.config.timeframe,
            self.exchange.name(),
            self.config.stop_loss_pct * Decimal::ONE_HUNDRED,
            self.config.take_profit_pct * Decimal::ONE_HUNDRED,
            self.config.take_profit_mode,
            self.config.daily_spend_cap
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.run_tick(Utc::now()).await {
                Ok(report) => {
                    self.log_status(&report);
                    self.config.poll_interval()
                }
                Err(e) => {
                    log_tick_error(&e);
                    self.config.error_backoff()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            "👋 RSI bot stopped | Realized P&L: ${:.2} over {} exits",
            self.position_manager.total_pnl(),
            self.position_manager.exit_count()
        );
    }

    fn emit_outcome(&mut self, outcome: &ExecutionOutcome, now: DateTime<Utc>) {
        let event = match outcome {
            ExecutionOutcome::Entered {
                entry_price,
                notional,
                spent_24h,
                ..
            } => TradeEvent::Entry {
                timestamp: now,
                entry_price: *entry_price,
                notional: *notional,
                spent_24h: *spent_24h,
            },
            ExecutionOutcome::Exited(closed) => TradeEvent::Exit {
                timestamp: now,
                entry_price: closed.entry_price,
                exit_price: closed.exit_price,
                quantity: closed.quantity,
                realized_pnl: closed.realized_pnl,
                reason: closed.reason,
            },
            ExecutionOutcome::Skipped => return,
        };
        self.sink.emit(&event);
    }

    fn log_status(&self, report: &TickReport) {
        let cap = self.config.daily_spend_cap;
        tracing::info!(
            "  Cap left: ${:.2} | Realized P&L: ${:.2}",
            self.ledger.remaining_allowance(report.timestamp, cap),
            self.position_manager.total_pnl()
        );

        let position = self.position_manager.position();
        if let Some(entry_price) = position.entry_price() {
            let unrealized = self.position_manager.unrealized_pnl(report.price);
            let unrealized_pct = (report.price - entry_price) / entry_price * Decimal::ONE_HUNDRED;
            tracing::info!(
                "  Open: {:.8} | Entry: ${:.2} | Current: ${:.2} | P&L: ${:.2} ({:.2}%)",
                position.size(),
                entry_price,
                report.price,
                unrealized,
                unrealized_pct
            );
        }
    }
}

fn log_tick_error(err: &BotError) {
    match err.kind() {
        ErrorKind::SkippedTick => tracing::warn!("⏸ Skipping tick: {}", err),
        ErrorKind::Rejected => tracing::warn!("⚠️  Order not executed: {}", err),
        ErrorKind::Transient => tracing::error!("❌ Error: {} (retrying after backoff)", err),
        ErrorKind::Internal => tracing::error!("❌ Internal error: {}", err),
    }
}
