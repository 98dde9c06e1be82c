// Technical indicators module
// RSI drives entries; everything else is risk-rule based

pub mod rsi;

pub use rsi::calculate_rsi;
