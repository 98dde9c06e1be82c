// Risk management module
pub mod spend_ledger;

pub use spend_ledger::{SpendLedger, SpendRecord};
