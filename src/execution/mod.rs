// Decision engine and order execution module
pub mod exchange;
pub mod executor;
pub mod paper;
pub mod position_manager;
pub mod trading_loop;

pub use exchange::Exchange;
pub use executor::{ExecutionOutcome, Executor};
pub use paper::PaperExchange;
pub use position_manager::{
    ClosedTrade, ExecutionAction, ExecutionDecision, Position, PositionManager, PositionState,
    TradingRules,
};
pub use trading_loop::{TickReport, TradingLoop};
