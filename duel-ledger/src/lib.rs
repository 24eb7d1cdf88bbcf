mod ledger;

pub use ledger::Ledger;
