//! Stock ledger persistence boundary.
//!
//! This module defines the transactional surface of the warehouse-aware
//! ledger (`StockLedger`) and the legacy per-item ledger (`LegacyLedger`)
//! without making storage assumptions. `InMemoryLedgerStore` backs tests and
//! dev; `PostgresLedgerStore` backs production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LegacyLedger, StockIssue, StockLedger, StockReceipt};
