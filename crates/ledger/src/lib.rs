//! `kardex-ledger` — stock ledger domain model.
//!
//! Pure types and decision logic: items, warehouses, lots, audit entries,
//! the FIFO allocation planner, normalized commands, and the legacy
//! per-item ledger. Persistence lives in `kardex-infra`.

pub mod allocation;
pub mod commands;
pub mod entry;
pub mod item;
pub mod legacy;
pub mod lot;

pub use allocation::{LotDeduction, allocate_fifo};
pub use commands::{AdjustStock, DecrementStock, IncrementStock, LedgerCommand};
pub use entry::{
    Direction, DocumentKind, DocumentRef, EntryFilter, InventoryLogEntry, MovementMeta,
    TransactionType,
};
pub use item::{Item, NewItem, Warehouse};
pub use legacy::{AdjustmentTarget, MovementKind, StockAdjustment, StockMovement};
pub use lot::Lot;
