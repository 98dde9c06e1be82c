// Exchange connectivity seam
// The decision engine only ever talks to the market through this trait.
// Implementations own retries, authentication and rate limiting.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{Fill, OrderAmount, OrderSide, PriceSample};
use crate::Result;

#[async_trait]
pub trait Exchange: Send + Sync {
    /// Recent candle closes, oldest first
    async fn fetch_recent_closes(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<PriceSample>>;

    /// Last traded price
    async fn fetch_current_price(&self, symbol: &str) -> Result<Decimal>;

    /// Submit a market order and wait for its fill
    ///
    /// Fails with `OrderRejected` when the venue refuses the order and with
    /// `Connectivity` when it cannot be reached.
    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: OrderAmount,
    ) -> Result<Fill>;

    /// Venue name for log lines
    fn name(&self) -> &'static str;
}
