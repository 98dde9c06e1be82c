use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closing price of one candle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub close: Decimal,
}

impl PriceSample {
    pub fn new(timestamp: DateTime<Utc>, close: Decimal) -> Self {
        Self { timestamp, close }
    }
}

/// Extract closing prices from samples (oldest first)
pub fn closes(samples: &[PriceSample]) -> Vec<Decimal> {
    samples.iter().map(|s| s.close).collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Size of a market order
///
/// Entries are sized in quote currency, exits in base-asset units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OrderAmount {
    Notional(Decimal),
    Quantity(Decimal),
}

impl OrderAmount {
    /// Amount in base-asset units at the given price
    pub fn base_quantity(&self, price: Decimal) -> Decimal {
        match *self {
            OrderAmount::Notional(notional) => notional / price,
            OrderAmount::Quantity(quantity) => quantity,
        }
    }
}

/// Confirmed result of a market order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fill {
    pub order_id: String,
    pub filled_quantity: Decimal,
    pub filled_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    PartialTakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::PartialTakeProfit => write!(f, "partial-take-profit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_closes_keep_order() {
        let now = Utc::now();
        let samples = vec![
            PriceSample::new(now - chrono::Duration::minutes(2), dec!(100)),
            PriceSample::new(now - chrono::Duration::minutes(1), dec!(101.5)),
            PriceSample::new(now, dec!(99)),
        ];

        assert_eq!(closes(&samples), vec![dec!(100), dec!(101.5), dec!(99)]);
    }

    #[test]
    fn test_order_amount_base_quantity() {
        assert_eq!(OrderAmount::Notional(dec!(100)).base_quantity(dec!(50)), dec!(2));
        assert_eq!(OrderAmount::Quantity(dec!(0.3)).base_quantity(dec!(50)), dec!(0.3));
    }

    #[test]
    fn test_exit_reason_serializes_kebab_case() {
        let json = serde_json::to_string(&ExitReason::PartialTakeProfit).unwrap();
        assert_eq!(json, "\"partial-take-profit\"");
        assert_eq!(ExitReason::StopLoss.to_string(), "stop-loss");
    }
}
