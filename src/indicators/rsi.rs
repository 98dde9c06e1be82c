use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{BotError, Result};

/// Calculate Relative Strength Index (RSI)
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Gains and losses are averaged with a simple mean over the last `period`
/// deltas (no Wilder smoothing). An average loss of zero yields 100.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
pub fn calculate_rsi(prices: &[Decimal], period: usize) -> Result<Decimal> {
    if period == 0 {
        return Err(BotError::Configuration("RSI period must be at least 1".into()));
    }
    if prices.len() < period + 1 {
        return Err(BotError::InsufficientData {
            needed: period + 1,
            got: prices.len(),
        });
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);

    // Calculate price changes
    for window in prices.windows(2) {
        let change = window[1] - window[0];
        if change > Decimal::ZERO {
            gains.push(change);
            losses.push(Decimal::ZERO);
        } else {
            gains.push(Decimal::ZERO);
            losses.push(change.abs());
        }
    }

    let period_dec = Decimal::from(period);
    let avg_gain: Decimal = gains.iter().rev().take(period).sum::<Decimal>() / period_dec;
    let avg_loss: Decimal = losses.iter().rev().take(period).sum::<Decimal>() / period_dec;

    if avg_loss.is_zero() {
        return Ok(dec!(100));
    }

    let rs = avg_gain / avg_loss;
    let rsi = dec!(100) - (dec!(100) / (Decimal::ONE + rs));

    Ok(rsi.clamp(Decimal::ZERO, dec!(100)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|&v| Decimal::from(v)).collect()
    }

    #[test]
    fn test_rsi_reference_value() {
        // Deltas over the last 14: gains sum 10, losses sum 17
        // RSI = 100 - 100 / (1 + 10/17) = 1000/27
        let closes = prices(&[
            100, 102, 101, 103, 99, 100, 104, 105, 99, 98, 97, 96, 95, 94, 93,
        ]);

        let rsi = calculate_rsi(&closes, 14).unwrap();
        assert_eq!(rsi.round_dp(10), dec!(37.0370370370));
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let closes = prices(&[100, 102, 101]);
        let err = calculate_rsi(&closes, 14).unwrap_err();
        assert!(matches!(
            err,
            BotError::InsufficientData { needed: 15, got: 3 }
        ));
    }

    #[test]
    fn test_rsi_exactly_period_plus_one() {
        let closes = prices(&[100, 101, 100]);
        assert!(calculate_rsi(&closes, 2).is_ok());
        assert!(calculate_rsi(&closes[..2], 2).is_err());
    }

    #[test]
    fn test_rsi_zero_period_rejected() {
        let closes = prices(&[100, 101]);
        let err = calculate_rsi(&closes, 0).unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));
        assert_eq!(err.to_string(), "Configuration error: RSI period must be at least 1");
    }

    #[test]
    fn test_rsi_all_gains() {
        let closes = prices(&[100, 101, 102, 103, 104, 105]);
        assert_eq!(calculate_rsi(&closes, 5).unwrap(), dec!(100));
    }

    #[test]
    fn test_rsi_flat_prices_is_100() {
        let closes = prices(&[100, 100, 100, 100]);
        assert_eq!(calculate_rsi(&closes, 3).unwrap(), dec!(100));
    }

    #[test]
    fn test_rsi_all_losses_is_zero() {
        let closes = prices(&[105, 104, 103, 102, 101, 100]);
        assert_eq!(calculate_rsi(&closes, 5).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_rsi_only_uses_last_period_deltas() {
        // A crash far outside the window must not matter
        let closes = prices(&[500, 100, 101, 102, 103]);
        assert_eq!(calculate_rsi(&closes, 3).unwrap(), dec!(100));
    }

    #[test]
    fn test_rsi_within_bounds() {
        let closes = prices(&[
            44, 45, 43, 47, 46, 48, 41, 49, 50, 44, 43, 46, 47, 45, 49, 40, 42,
        ]);
        for period in 1..closes.len() {
            let rsi = calculate_rsi(&closes, period).unwrap();
            assert!(rsi >= Decimal::ZERO && rsi <= dec!(100), "period {period}: {rsi}");
        }
    }
}
