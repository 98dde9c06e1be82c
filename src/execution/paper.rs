use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Mutex;
use uuid::Uuid;

use crate::api::BinanceClient;
use crate::execution::Exchange;
use crate::models::{Fill, OrderAmount, OrderSide, PriceSample};
use crate::{BotError, Result};

/// Simulated balances of the paper account
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperBalances {
    pub quote: Decimal,
    pub base: Decimal,
}

/// Exchange backed by live market data with simulated fills
///
/// Market orders fill in full at the current ticker price.
pub struct PaperExchange {
    client: BinanceClient,
    min_order_qty: Decimal,
    balances: Mutex<PaperBalances>,
}

impl PaperExchange {
    pub fn new(client: BinanceClient, starting_quote: Decimal, min_order_qty: Decimal) -> Self {
        Self {
            client,
            min_order_qty,
            balances: Mutex::new(PaperBalances {
                quote: starting_quote,
                base: Decimal::ZERO,
            }),
        }
    }

    pub fn balances(&self) -> Result<PaperBalances> {
        self.balances
            .lock()
            .map(|b| *b)
            .map_err(|_| BotError::Position("paper balances lock poisoned".into()))
    }

    fn settle(&self, side: OrderSide, quantity: Decimal, price: Decimal) -> Result<()> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| BotError::Position("paper balances lock poisoned".into()))?;
        let cost = quantity * price;

        match side {
            OrderSide::Buy => {
                if cost > balances.quote {
                    return Err(BotError::OrderRejected(format!(
                        "insufficient quote balance: need {:.2}, have {:.2}",
                        cost, balances.quote
                    )));
                }
                balances.quote -= cost;
                balances.base += quantity;
            }
            OrderSide::Sell => {
                if quantity > balances.base {
                    return Err(BotError::OrderRejected(format!(
                        "insufficient base balance: need {}, have {}",
                        quantity, balances.base
                    )));
                }
                balances.base -= quantity;
                balances.quote += cost;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn fetch_recent_closes(
        &self,
        symbol: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<PriceSample>> {
        self.client.get_klines(symbol, timeframe, count).await
    }

    async fn fetch_current_price(&self, symbol: &str) -> Result<Decimal> {
        self.client.get_ticker_price(symbol).await
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: OrderAmount,
    ) -> Result<Fill> {
        let price = self.client.get_ticker_price(symbol).await?;
        if price <= Decimal::ZERO {
            return Err(BotError::InvalidResponse(format!(
                "non-positive ticker price {} for {}",
                price, symbol
            )));
        }

        let quantity = amount.base_quantity(price);
        if quantity <= Decimal::ZERO || quantity < self.min_order_qty {
            return Err(BotError::OrderRejected(format!(
                "quantity {} below minimum {}",
                quantity, self.min_order_qty
            )));
        }

        self.settle(side, quantity, price)?;

        let order_id = Uuid::new_v4().to_string();
        tracing::info!(
            order_id = %order_id,
            side = %side,
            quantity = %quantity,
            price = %price,
            "📝 Paper fill"
        );

        Ok(Fill {
            order_id,
            filled_quantity: quantity,
            filled_price: Some(price),
        })
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}
