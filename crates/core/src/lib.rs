//! `kardex-core` — ledger foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{LedgerError, LedgerResult};
pub use id::{
    AdjustmentId, EntryId, ItemId, LotId, MaterialId, MovementId, ProductId, UserId, WarehouseId,
};
