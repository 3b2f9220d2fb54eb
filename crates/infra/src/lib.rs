//! Infrastructure layer: ledger stores, master data, command execution.

pub mod import;
pub mod ledger_store;
pub mod legacy_bridge;
pub mod master_data;
pub mod service;

#[cfg(test)]
mod integration_tests;

pub use import::{BatchSummary, CommandRow, InitialBalanceRow, RowFailure};
pub use ledger_store::{
    InMemoryLedgerStore, LegacyLedger, PostgresLedgerStore, StockIssue, StockLedger, StockReceipt,
};
pub use legacy_bridge::LegacyLedgerBridge;
pub use master_data::MasterData;
pub use service::{CommandOutcome, LedgerService};
