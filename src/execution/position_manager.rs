use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{BotConfig, TakeProfitMode};
use crate::models::ExitReason;
use crate::{BotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    Flat,
    Long,
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionState::Flat => write!(f, "flat"),
            PositionState::Long => write!(f, "long"),
        }
    }
}

/// Current exposure in the traded asset
///
/// Entry fields only exist while long, so a flat position can never carry
/// a stale entry price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Position {
    Flat,
    Long {
        entry_price: Decimal,
        size: Decimal, // base-asset units still held
        opened_at: DateTime<Utc>,
    },
}

impl Position {
    pub fn state(&self) -> PositionState {
        match self {
            Position::Flat => PositionState::Flat,
            Position::Long { .. } => PositionState::Long,
        }
    }

    pub fn entry_price(&self) -> Option<Decimal> {
        match self {
            Position::Flat => None,
            Position::Long { entry_price, .. } => Some(*entry_price),
        }
    }

    pub fn size(&self) -> Decimal {
        match self {
            Position::Flat => Decimal::ZERO,
            Position::Long { size, .. } => *size,
        }
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Position::Flat => None,
            Position::Long { opened_at, .. } => Some(*opened_at),
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Position::Long { .. })
    }
}

/// Thresholds the state machine applies on every tick
#[derive(Debug, Clone, PartialEq)]
pub struct TradingRules {
    pub rsi_buy_threshold: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub take_profit_mode: TakeProfitMode,
    pub trade_amount_usdt: Decimal,
    pub daily_spend_cap: Decimal,
    pub min_order_qty: Decimal,
}

impl From<&BotConfig> for TradingRules {
    fn from(config: &BotConfig) -> Self {
        Self {
            rsi_buy_threshold: config.rsi_buy_threshold,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            take_profit_mode: config.take_profit_mode,
            trade_amount_usdt: config.trade_amount_usdt,
            daily_spend_cap: config.daily_spend_cap,
            min_order_qty: config.min_order_qty,
        }
    }
}

impl Default for TradingRules {
    fn default() -> Self {
        Self::from(&BotConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    /// Buy `notional` worth of the asset
    Enter { notional: Decimal },
    /// Sell `quantity` base units
    Exit {
        quantity: Decimal,
        reason: ExitReason,
    },
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

impl ExecutionDecision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: ExecutionAction::Skip,
            reason: reason.into(),
        }
    }
}

/// Result of selling (part of) a position
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub realized_pnl: Decimal,
    pub reason: ExitReason,
    pub remaining_size: Decimal,
}

/// Flat/long state machine for a single asset
pub struct PositionManager {
    position: Position,
    rules: TradingRules,
    total_pnl: Decimal, // Realized P&L across all exits
    exit_count: u32,
}

impl PositionManager {
    pub fn new(rules: TradingRules) -> Self {
        Self {
            position: Position::Flat,
            rules,
            total_pnl: Decimal::ZERO,
            exit_count: 0,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn rules(&self) -> &TradingRules {
        &self.rules
    }

    /// Get total realized P&L
    pub fn total_pnl(&self) -> Decimal {
        self.total_pnl
    }

    /// Number of exit fills applied so far (partial exits included)
    pub fn exit_count(&self) -> u32 {
        self.exit_count
    }

    /// Unrealized P&L of the open position at `current_price`
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        match self.position {
            Position::Flat => Decimal::ZERO,
            Position::Long {
                entry_price, size, ..
            } => (current_price - entry_price) * size,
        }
    }

    /// Check if the open position hit an exit threshold
    ///
    /// Stop-loss wins whenever both thresholds are crossed on the same tick.
    pub fn should_exit(&self, current_price: Decimal) -> Option<ExitReason> {
        let entry_price = self.position.entry_price()?;

        let stop_loss = entry_price * (Decimal::ONE - self.rules.stop_loss_pct);
        if current_price <= stop_loss {
            return Some(ExitReason::StopLoss);
        }

        let take_profit = entry_price * (Decimal::ONE + self.rules.take_profit_pct);
        if current_price >= take_profit {
            return Some(match self.rules.take_profit_mode {
                TakeProfitMode::Full => ExitReason::TakeProfit,
                TakeProfitMode::Partial => ExitReason::PartialTakeProfit,
            });
        }

        None
    }

    /// Decide what to do on this tick
    ///
    /// # Arguments
    /// * `current_price` - Latest traded price
    /// * `rsi` - Signal computed from recent closes
    /// * `spent_24h` - Entry notional spent in the trailing 24h window
    pub fn decide(
        &self,
        current_price: Decimal,
        rsi: Decimal,
        spent_24h: Decimal,
    ) -> ExecutionDecision {
        match &self.position {
            Position::Flat => self.decide_entry(rsi, spent_24h),
            Position::Long { size, .. } => self.decide_exit(current_price, *size),
        }
    }

    fn decide_entry(&self, rsi: Decimal, spent_24h: Decimal) -> ExecutionDecision {
        let rules = &self.rules;

        if rsi >= rules.rsi_buy_threshold {
            return ExecutionDecision::skip(format!(
                "No buy signal (RSI {:.2} >= {})",
                rsi, rules.rsi_buy_threshold
            ));
        }

        if spent_24h + rules.trade_amount_usdt > rules.daily_spend_cap {
            return ExecutionDecision::skip(format!(
                "Daily cap reached (${:.2} spent, cap ${:.2})",
                spent_24h, rules.daily_spend_cap
            ));
        }

        ExecutionDecision {
            action: ExecutionAction::Enter {
                notional: rules.trade_amount_usdt,
            },
            reason: format!(
                "RSI {:.2} below {} with ${:.2} of cap left",
                rsi,
                rules.rsi_buy_threshold,
                rules.daily_spend_cap - spent_24h
            ),
        }
    }

    fn decide_exit(&self, current_price: Decimal, size: Decimal) -> ExecutionDecision {
        let Some(reason) = self.should_exit(current_price) else {
            return ExecutionDecision::skip("Holding position");
        };

        let quantity = match reason {
            ExitReason::StopLoss | ExitReason::TakeProfit => size,
            ExitReason::PartialTakeProfit => {
                let profit_notional = self.rules.trade_amount_usdt * self.rules.take_profit_pct;
                let quantity = (profit_notional / current_price).min(size);

                if quantity < self.rules.min_order_qty {
                    return ExecutionDecision::skip(format!(
                        "Partial take-profit of {} below minimum quantity {}",
                        quantity, self.rules.min_order_qty
                    ));
                }
                // A remainder under the minimum could never be sold again
                if size - quantity < self.rules.min_order_qty {
                    size
                } else {
                    quantity
                }
            }
        };

        ExecutionDecision {
            action: ExecutionAction::Exit { quantity, reason },
            reason: format!("{} at ${:.2}", reason, current_price),
        }
    }

    /// Go long after a confirmed buy fill
    ///
    /// Size is the notional converted at the fill price.
    pub fn open_position(
        &mut self,
        fill_price: Decimal,
        notional: Decimal,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.position.is_long() {
            return Err(BotError::Position("Already have open position".into()));
        }
        if fill_price <= Decimal::ZERO {
            return Err(BotError::Position(format!(
                "Fill price must be positive, got {}",
                fill_price
            )));
        }

        let size = notional / fill_price;
        self.position = Position::Long {
            entry_price: fill_price,
            size,
            opened_at: at,
        };

        tracing::debug!(entry_price = %fill_price, size = %size, "Opened position");
        Ok(())
    }

    /// Apply a confirmed sell fill
    ///
    /// Sells at most the remaining size and goes flat once nothing is left.
    pub fn reduce_position(
        &mut self,
        quantity: Decimal,
        exit_price: Decimal,
        reason: ExitReason,
    ) -> Result<ClosedTrade> {
        let Position::Long {
            entry_price, size, ..
        } = self.position
        else {
            return Err(BotError::Position("No open position to sell".into()));
        };

        if quantity <= Decimal::ZERO {
            return Err(BotError::Position(format!(
                "Sell quantity must be positive, got {}",
                quantity
            )));
        }

        let sold = quantity.min(size);
        let remaining_size = size - sold;
        let realized_pnl = (exit_price - entry_price) * sold;

        if remaining_size > Decimal::ZERO {
            if let Position::Long { size, .. } = &mut self.position {
                *size = remaining_size;
            }
        } else {
            self.position = Position::Flat;
        }

        self.total_pnl += realized_pnl;
        self.exit_count += 1;

        Ok(ClosedTrade {
            entry_price,
            exit_price,
            quantity: sold,
            realized_pnl,
            reason,
            remaining_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn rules(mode: TakeProfitMode) -> TradingRules {
        TradingRules {
            take_profit_mode: mode,
            ..Default::default()
        }
    }

    fn long_at(entry: Decimal, notional: Decimal, mode: TakeProfitMode) -> PositionManager {
        let mut pm = PositionManager::new(rules(mode));
        pm.open_position(entry, notional, now()).unwrap();
        pm
    }

    #[test]
    fn test_starts_flat() {
        let pm = PositionManager::new(TradingRules::default());
        assert_eq!(pm.position(), &Position::Flat);
        assert_eq!(pm.position().size(), Decimal::ZERO);
        assert_eq!(pm.position().entry_price(), None);
        assert_eq!(pm.position().opened_at(), None);
    }

    #[test]
    fn test_open_position() {
        let pm = long_at(dec!(100), dec!(100), TakeProfitMode::Full);

        assert_eq!(pm.position().state(), PositionState::Long);
        assert_eq!(pm.position().entry_price(), Some(dec!(100)));
        assert_eq!(pm.position().size(), dec!(1));
        assert_eq!(pm.position().opened_at(), Some(now()));
    }

    #[test]
    fn test_prevent_duplicate_positions() {
        let mut pm = long_at(dec!(100), dec!(100), TakeProfitMode::Full);
        let result = pm.open_position(dec!(105), dec!(100), now());

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Already have open position"));
        assert_eq!(pm.position().entry_price(), Some(dec!(100)));
    }

    #[test]
    fn test_rejects_non_positive_fill_price() {
        let mut pm = PositionManager::new(TradingRules::default());
        assert!(pm.open_position(Decimal::ZERO, dec!(100), now()).is_err());
        assert_eq!(pm.position(), &Position::Flat);
    }

    #[test]
    fn test_entry_on_oversold_signal() {
        let pm = PositionManager::new(TradingRules::default());
        let decision = pm.decide(dec!(100), dec!(20), Decimal::ZERO);

        assert_eq!(
            decision.action,
            ExecutionAction::Enter {
                notional: dec!(100)
            }
        );
    }

    #[test]
    fn test_no_entry_at_threshold() {
        let pm = PositionManager::new(TradingRules::default());
        let decision = pm.decide(dec!(100), dec!(30), Decimal::ZERO);

        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("No buy signal"));
    }

    #[test]
    fn test_entry_allowed_up_to_cap() {
        let pm = PositionManager::new(TradingRules::default());
        let decision = pm.decide(dec!(100), dec!(10), dec!(900));

        assert!(matches!(decision.action, ExecutionAction::Enter { .. }));
    }

    #[test]
    fn test_cap_blocks_entry_for_any_rsi() {
        let pm = PositionManager::new(TradingRules::default());

        for rsi in [0, 1, 10, 29, 30, 50, 100] {
            let decision = pm.decide(dec!(100), Decimal::from(rsi), dec!(900.01));
            assert_eq!(decision.action, ExecutionAction::Skip, "rsi {rsi}");
        }

        let decision = pm.decide(dec!(100), dec!(5), dec!(950));
        assert!(decision.reason.contains("Daily cap"));
    }

    #[test]
    fn test_stop_loss_triggered() {
        let pm = long_at(dec!(100), dec!(100), TakeProfitMode::Full);

        assert_eq!(pm.should_exit(dec!(89.9)), Some(ExitReason::StopLoss));
        assert_eq!(pm.should_exit(dec!(90)), Some(ExitReason::StopLoss));
        assert_eq!(pm.should_exit(dec!(90.01)), None);

        let decision = pm.decide(dec!(89.9), dec!(50), Decimal::ZERO);
        assert_eq!(
            decision.action,
            ExecutionAction::Exit {
                quantity: dec!(1),
                reason: ExitReason::StopLoss
            }
        );
    }

    #[test]
    fn test_stop_loss_wins_over_take_profit() {
        // Contrived thresholds so that 200 satisfies both conditions
        let rules = TradingRules {
            stop_loss_pct: dec!(-1.5), // stop at 250
            take_profit_pct: dec!(0.05),
            take_profit_mode: TakeProfitMode::Full,
            ..Default::default()
        };
        let mut pm = PositionManager::new(rules);
        pm.open_position(dec!(100), dec!(100), now()).unwrap();

        assert_eq!(pm.should_exit(dec!(200)), Some(ExitReason::StopLoss));
        let decision = pm.decide(dec!(200), dec!(50), Decimal::ZERO);
        assert!(matches!(
            decision.action,
            ExecutionAction::Exit {
                reason: ExitReason::StopLoss,
                ..
            }
        ));
    }

    #[test]
    fn test_stop_loss_sells_remaining_size_after_partial() {
        let mut pm = long_at(dec!(100), dec!(100), TakeProfitMode::Partial);
        pm.reduce_position(dec!(0.25), dec!(106), ExitReason::PartialTakeProfit)
            .unwrap();

        let decision = pm.decide(dec!(80), dec!(50), Decimal::ZERO);
        assert_eq!(
            decision.action,
            ExecutionAction::Exit {
                quantity: dec!(0.75),
                reason: ExitReason::StopLoss
            }
        );
    }

    #[test]
    fn test_full_take_profit() {
        let pm = long_at(dec!(100), dec!(100), TakeProfitMode::Full);

        assert_eq!(pm.should_exit(dec!(104.99)), None);
        let decision = pm.decide(dec!(105), dec!(80), Decimal::ZERO);
        assert_eq!(
            decision.action,
            ExecutionAction::Exit {
                quantity: dec!(1),
                reason: ExitReason::TakeProfit
            }
        );
    }

    #[test]
    fn test_partial_take_profit_sizing() {
        let pm = long_at(dec!(100), dec!(100), TakeProfitMode::Partial);

        // 100 * 0.05 = $5 of profit, at $125 that is 0.04 units
        let decision = pm.decide(dec!(125), dec!(80), Decimal::ZERO);
        assert_eq!(
            decision.action,
            ExecutionAction::Exit {
                quantity: dec!(0.04),
                reason: ExitReason::PartialTakeProfit
            }
        );
    }

    #[test]
    fn test_partial_take_profit_capped_at_size() {
        let rules = TradingRules {
            trade_amount_usdt: dec!(100),
            take_profit_pct: dec!(0.05),
            take_profit_mode: TakeProfitMode::Partial,
            min_order_qty: Decimal::ZERO,
            ..Default::default()
        };
        let mut pm = PositionManager::new(rules);
        pm.open_position(dec!(100), dec!(1), now()).unwrap(); // 0.01 units

        let decision = pm.decide(dec!(105), dec!(80), Decimal::ZERO);
        assert_eq!(
            decision.action,
            ExecutionAction::Exit {
                quantity: dec!(0.01),
                reason: ExitReason::PartialTakeProfit
            }
        );
    }

    #[test]
    fn test_partial_take_profit_sweeps_unsellable_remainder() {
        let rules = TradingRules {
            min_order_qty: dec!(0.02),
            take_profit_mode: TakeProfitMode::Partial,
            ..Default::default()
        };
        let mut pm = PositionManager::new(rules);
        pm.open_position(dec!(100), dec!(100), now()).unwrap();
        pm.reduce_position(dec!(0.95), dec!(107), ExitReason::PartialTakeProfit)
            .unwrap();

        // $5 at $107 is ~0.0467 units, which would leave ~0.0033 behind
        let decision = pm.decide(dec!(107), dec!(80), Decimal::ZERO);
        assert_eq!(
            decision.action,
            ExecutionAction::Exit {
                quantity: dec!(0.05),
                reason: ExitReason::PartialTakeProfit
            }
        );

        let closed = pm
            .reduce_position(dec!(0.05), dec!(107), ExitReason::PartialTakeProfit)
            .unwrap();
        assert_eq!(closed.remaining_size, Decimal::ZERO);
        assert_eq!(pm.position(), &Position::Flat);
    }

    #[test]
    fn test_repeated_partials_never_strand_dust() {
        let rules = TradingRules {
            min_order_qty: dec!(0.02),
            take_profit_mode: TakeProfitMode::Partial,
            ..Default::default()
        };
        let mut pm = PositionManager::new(rules);
        pm.open_position(dec!(100), dec!(100), now()).unwrap();

        for _ in 0..40 {
            let decision = pm.decide(dec!(107), dec!(80), Decimal::ZERO);
            let ExecutionAction::Exit { quantity, reason } = decision.action else {
                break;
            };
            pm.reduce_position(quantity, dec!(107), reason).unwrap();
            if let Position::Long { size, .. } = pm.position() {
                assert!(*size >= dec!(0.02), "stranded remainder {}", size);
            }
        }

        assert_eq!(pm.position(), &Position::Flat);
    }

    #[test]
    fn test_partial_take_profit_below_minimum_is_noop() {
        let rules = TradingRules {
            min_order_qty: dec!(0.001),
            take_profit_mode: TakeProfitMode::Partial,
            ..Default::default()
        };
        let mut pm = PositionManager::new(rules);
        pm.open_position(dec!(100), dec!(100), now()).unwrap();
        // Leave only dust behind
        pm.reduce_position(dec!(0.9995), dec!(106), ExitReason::PartialTakeProfit)
            .unwrap();
        let before = pm.position().clone();

        let decision = pm.decide(dec!(106), dec!(80), Decimal::ZERO);

        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("below minimum"));
        assert_eq!(pm.position(), &before);
    }

    #[test]
    fn test_holding_between_thresholds() {
        let pm = long_at(dec!(100), dec!(100), TakeProfitMode::Full);
        let decision = pm.decide(dec!(101), dec!(10), Decimal::ZERO);

        assert_eq!(decision.action, ExecutionAction::Skip);
        assert!(decision.reason.contains("Holding"));
    }

    #[test]
    fn test_full_exit_goes_flat() {
        let mut pm = long_at(dec!(100), dec!(100), TakeProfitMode::Full);
        let closed = pm
            .reduce_position(dec!(1), dec!(105), ExitReason::TakeProfit)
            .unwrap();

        assert_eq!(closed.realized_pnl, dec!(5));
        assert_eq!(closed.quantity, dec!(1));
        assert_eq!(closed.remaining_size, Decimal::ZERO);
        assert_eq!(pm.position(), &Position::Flat);
        assert_eq!(pm.total_pnl(), dec!(5));
        assert_eq!(pm.exit_count(), 1);
    }

    #[test]
    fn test_partial_exit_stays_long() {
        let mut pm = long_at(dec!(100), dec!(200), TakeProfitMode::Partial);
        let closed = pm
            .reduce_position(dec!(0.5), dec!(110), ExitReason::PartialTakeProfit)
            .unwrap();

        assert_eq!(closed.realized_pnl, dec!(5));
        assert_eq!(closed.remaining_size, dec!(1.5));
        assert_eq!(pm.position().state(), PositionState::Long);
        assert_eq!(pm.position().size(), dec!(1.5));
        assert_eq!(pm.position().entry_price(), Some(dec!(100)));
        assert_eq!(pm.position().opened_at(), Some(now()));
    }

    #[test]
    fn test_oversell_is_capped() {
        let mut pm = long_at(dec!(100), dec!(100), TakeProfitMode::Full);
        let closed = pm
            .reduce_position(dec!(3), dec!(90), ExitReason::StopLoss)
            .unwrap();

        assert_eq!(closed.quantity, dec!(1));
        assert_eq!(closed.realized_pnl, dec!(-10));
        assert_eq!(pm.position(), &Position::Flat);
    }

    #[test]
    fn test_cannot_sell_when_flat() {
        let mut pm = PositionManager::new(TradingRules::default());
        let result = pm.reduce_position(dec!(1), dec!(100), ExitReason::StopLoss);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("No open position"));
    }

    #[test]
    fn test_unrealized_pnl() {
        let pm = long_at(dec!(100), dec!(200), TakeProfitMode::Full);
        assert_eq!(pm.unrealized_pnl(dec!(110)), dec!(20));
        assert_eq!(pm.unrealized_pnl(dec!(95)), dec!(-10));

        let flat = PositionManager::new(TradingRules::default());
        assert_eq!(flat.unrealized_pnl(dec!(95)), Decimal::ZERO);
    }
}
