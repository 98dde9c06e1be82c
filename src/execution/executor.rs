use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::execution::{ClosedTrade, Exchange, ExecutionAction, ExecutionDecision, PositionManager};
use crate::models::{ExitReason, OrderAmount, OrderSide};
use crate::risk::SpendLedger;
use crate::{BotError, Result};

/// What a decision turned into once the exchange confirmed it
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Entered {
        entry_price: Decimal,
        notional: Decimal,
        size: Decimal,
        spent_24h: Decimal,
    },
    Exited(ClosedTrade),
    Skipped,
}

/// Turns decisions into market orders and applies confirmed fills
///
/// State is only touched after the exchange reports a fill, so a failed
/// order leaves the position and the ledger exactly as they were.
pub struct Executor {
    symbol: String,
}

impl Executor {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Execute a decision against the exchange
    ///
    /// # Arguments
    /// * `current_price` - Tick price, used for exit P&L when the fill has no price
    /// * `now` - Tick timestamp for the position and ledger records
    pub async fn execute<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        decision: &ExecutionDecision,
        current_price: Decimal,
        now: DateTime<Utc>,
        position_manager: &mut PositionManager,
        ledger: &mut SpendLedger,
    ) -> Result<ExecutionOutcome> {
        match decision.action {
            ExecutionAction::Enter { notional } => {
                self.execute_buy(exchange, notional, now, position_manager, ledger)
                    .await
            }
            ExecutionAction::Exit { quantity, reason } => {
                self.execute_sell(exchange, quantity, reason, current_price, position_manager)
                    .await
            }
            ExecutionAction::Skip => Ok(ExecutionOutcome::Skipped),
        }
    }

    async fn execute_buy<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        notional: Decimal,
        now: DateTime<Utc>,
        position_manager: &mut PositionManager,
        ledger: &mut SpendLedger,
    ) -> Result<ExecutionOutcome> {
        if notional <= Decimal::ZERO {
            return Err(BotError::InvalidSpend(notional));
        }
        if position_manager.position().is_long() {
            return Err(BotError::Position("Already have open position".into()));
        }

        tracing::info!("🟢 Placing buy for ${:.2} USDT of {}", notional, self.symbol);

        let fill = exchange
            .submit_market_order(&self.symbol, OrderSide::Buy, OrderAmount::Notional(notional))
            .await?;

        let fill_price = fill
            .filled_price
            .filter(|price| *price > Decimal::ZERO)
            .ok_or(BotError::MissingFillPrice(OrderSide::Buy))?;

        position_manager.open_position(fill_price, notional, now)?;
        ledger.record_spend(notional, now)?;

        let size = position_manager.position().size();
        tracing::info!(
            "  ✓ Bought {:.8} @ ${:.2} (order {})",
            size,
            fill_price,
            fill.order_id
        );

        Ok(ExecutionOutcome::Entered {
            entry_price: fill_price,
            notional,
            size,
            spent_24h: ledger.total_spent(now),
        })
    }

    async fn execute_sell<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        quantity: Decimal,
        reason: ExitReason,
        current_price: Decimal,
        position_manager: &mut PositionManager,
    ) -> Result<ExecutionOutcome> {
        if !position_manager.position().is_long() {
            return Err(BotError::Position("No open position to sell".into()));
        }

        match reason {
            ExitReason::StopLoss => tracing::info!(
                "🔻 Price dropped to stop-loss level (${:.2}), exiting position",
                current_price
            ),
            ExitReason::TakeProfit => tracing::info!(
                "🔼 Take-profit hit at ${:.2}, selling {:.8}",
                current_price,
                quantity
            ),
            ExitReason::PartialTakeProfit => tracing::info!(
                "🔼 Selling {:.8} (partial) at profit target ${:.2}",
                quantity,
                current_price
            ),
        }

        let fill = exchange
            .submit_market_order(&self.symbol, OrderSide::Sell, OrderAmount::Quantity(quantity))
            .await?;

        if fill.filled_quantity <= Decimal::ZERO {
            return Err(BotError::OrderRejected(format!(
                "sell order {} was not filled",
                fill.order_id
            )));
        }

        // The sale happened even without a reported price, so the tick price stands in
        let exit_price = match fill.filled_price.filter(|price| *price > Decimal::ZERO) {
            Some(price) => price,
            None => {
                tracing::warn!(
                    "No fill price for sell order {}, using tick price ${:.2}",
                    fill.order_id,
                    current_price
                );
                current_price
            }
        };

        let closed = position_manager.reduce_position(fill.filled_quantity, exit_price, reason)?;

        tracing::info!(
            "  ✓ Sold {:.8} @ ${:.2} | P&L: ${:.2} | Remaining: {:.8}",
            closed.quantity,
            closed.exit_price,
            closed.realized_pnl,
            closed.remaining_size
        );

        Ok(ExecutionOutcome::Exited(closed))
    }
}
