pub mod settlement;
pub mod wager_ledger;

pub use wager_ledger::WagerLedger;
