use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::OrderSide;

/// Errors raised by the trading core and its collaborators
///
/// The decision loop is the only place these are caught; each variant
/// maps to one recovery behaviour there (see `BotError::kind`).
#[derive(Error, Debug)]
pub enum BotError {
    /// Not enough price history to compute the signal
    #[error("Insufficient data: {got} closes, need {needed}")]
    InsufficientData { needed: usize, got: usize },

    /// Market data feed or order API unreachable
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The exchange answered but the payload made no sense
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// The exchange refused the order
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// The order went through but no usable fill price came back
    #[error("No fill price reported for {0} order")]
    MissingFillPrice(OrderSide),

    #[error("Invalid spend amount: {0}")]
    InvalidSpend(Decimal),

    /// Position transition that the state machine does not allow
    #[error("Position error: {0}")]
    Position(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification used by the decision loop to pick a log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SkippedTick,
    Transient,
    Rejected,
    Internal,
}

impl BotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BotError::InsufficientData { .. } => ErrorKind::SkippedTick,
            BotError::Connectivity(_) | BotError::InvalidResponse(_) => ErrorKind::Transient,
            BotError::OrderRejected(_) | BotError::MissingFillPrice(_) => ErrorKind::Rejected,
            BotError::InvalidSpend(_) | BotError::Position(_) | BotError::Configuration(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BotError::InvalidResponse(err.to_string())
        } else {
            BotError::Connectivity(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::InvalidResponse(err.to_string())
    }
}

impl From<config::ConfigError> for BotError {
    fn from(err: config::ConfigError) -> Self {
        BotError::Configuration(err.to_string())
    }
}
