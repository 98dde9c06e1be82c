use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BotError, Result};

/// USDT committed to one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendRecord {
    pub timestamp: DateTime<Utc>,
    pub amount_usdt: Decimal,
}

/// Append-only record of entry spend with a trailing-window total
///
/// Records never leave the ledger. They only stop counting once they fall
/// out of the window, so the full history stays available for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpendLedger {
    records: Vec<SpendRecord>,
    window: Duration,
}

impl SpendLedger {
    /// Ledger with the standard 24 hour window
    pub fn new() -> Self {
        Self::with_window(Duration::hours(24))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            records: Vec::new(),
            window,
        }
    }

    /// Append a spend record
    pub fn record_spend(&mut self, amount_usdt: Decimal, at: DateTime<Utc>) -> Result<()> {
        if amount_usdt <= Decimal::ZERO {
            return Err(BotError::InvalidSpend(amount_usdt));
        }

        self.records.push(SpendRecord {
            timestamp: at,
            amount_usdt,
        });

        tracing::debug!(
            amount = %amount_usdt,
            records = self.records.len(),
            "Recorded spend"
        );

        Ok(())
    }

    /// Total spent in the window ending at `as_of`
    ///
    /// A record counts while `timestamp > as_of - window`.
    pub fn total_spent(&self, as_of: DateTime<Utc>) -> Decimal {
        let cutoff = as_of - self.window;
        self.records
            .iter()
            .filter(|r| r.timestamp > cutoff)
            .map(|r| r.amount_usdt)
            .sum()
    }

    /// True if spending `amount` now would push the window total over `cap`
    pub fn would_exceed_cap(&self, as_of: DateTime<Utc>, amount: Decimal, cap: Decimal) -> bool {
        self.total_spent(as_of) + amount > cap
    }

    /// How much can still be spent before hitting `cap`
    pub fn remaining_allowance(&self, as_of: DateTime<Utc>, cap: Decimal) -> Decimal {
        (cap - self.total_spent(as_of)).max(Decimal::ZERO)
    }

    pub fn records(&self) -> &[SpendRecord] {
        &self.records
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for SpendLedger {
    fn default() -> Self {
        Self::new()
    }
}
