// Trade events for persistence and observability collaborators
// The decision loop emits one `Tick` per successful tick, plus an `Entry`
// or `Exit` whenever a fill is applied. Sinks decide what to do with them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::execution::PositionState;
use crate::models::ExitReason;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TradeEvent {
    Tick {
        timestamp: DateTime<Utc>,
        price: Decimal,
        rsi: Decimal,
        state: PositionState,
    },
    Entry {
        timestamp: DateTime<Utc>,
        entry_price: Decimal,
        notional: Decimal,
        spent_24h: Decimal,
    },
    Exit {
        timestamp: DateTime<Utc>,
        entry_price: Decimal,
        exit_price: Decimal,
        quantity: Decimal,
        realized_pnl: Decimal,
        reason: ExitReason,
    },
}

pub trait EventSink: Send {
    fn emit(&mut self, event: &TradeEvent);
}

/// Writes events to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: &TradeEvent) {
        match event {
            TradeEvent::Tick {
                timestamp,
                price,
                rsi,
                state,
            } => {
                tracing::info!(
                    "⏱ {} | Price: ${:.2} | RSI: {:.2} | State: {}",
                    timestamp.to_rfc3339(),
                    price,
                    rsi,
                    state
                );
            }
            TradeEvent::Entry {
                entry_price,
                notional,
                spent_24h,
                ..
            } => {
                tracing::info!(
                    entry_price = %entry_price,
                    notional = %notional,
                    spent_24h = %spent_24h,
                    "📥 Entry recorded"
                );
            }
            TradeEvent::Exit {
                entry_price,
                exit_price,
                quantity,
                realized_pnl,
                reason,
                ..
            } => {
                tracing::info!(
                    entry_price = %entry_price,
                    exit_price = %exit_price,
                    quantity = %quantity,
                    realized_pnl = %realized_pnl,
                    reason = %reason,
                    "📤 Exit recorded"
                );
            }
        }

        match serde_json::to_string(event) {
            Ok(json) => tracing::debug!(target: "rsibot::events", "{}", json),
            Err(e) => tracing::warn!("Failed to serialize trade event: {}", e),
        }
    }
}

/// Keeps events in memory
///
/// Clones share the same buffer, so a caller can hand one clone to the loop
/// and read events back through another.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TradeEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TradeEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &TradeEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
