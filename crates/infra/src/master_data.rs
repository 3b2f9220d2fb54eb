//! Master-data resolution: human-entered codes to stable records.
//!
//! Collaborators hand the ledger natural keys (item and warehouse codes as
//! they appear on documents and import sheets). Resolution is
//! lookup-or-create: the first movement for an unknown code creates the
//! reference record. The ledger core treats this as opaque; it only needs
//! stable ids back.

use std::sync::Arc;

use kardex_core::LedgerResult;
use kardex_ledger::{Item, NewItem, Warehouse};

pub trait MasterData: Send + Sync {
    /// Resolve an item code, creating the item on first use with the
    /// supplied attributes.
    fn resolve_item(&self, code: &str, attrs: &NewItem) -> LedgerResult<Item>;

    /// Look up an item code without creating it.
    fn lookup_item(&self, code: &str) -> LedgerResult<Option<Item>>;

    /// Resolve a warehouse code, creating the warehouse on first use.
    fn resolve_warehouse(&self, code: &str, name: Option<&str>) -> LedgerResult<Warehouse>;

    /// Look up a warehouse code without creating it.
    fn lookup_warehouse(&self, code: &str) -> LedgerResult<Option<Warehouse>>;
}

impl<M> MasterData for Arc<M>
where
    M: MasterData + ?Sized,
{
    fn resolve_item(&self, code: &str, attrs: &NewItem) -> LedgerResult<Item> {
        (**self).resolve_item(code, attrs)
    }

    fn lookup_item(&self, code: &str) -> LedgerResult<Option<Item>> {
        (**self).lookup_item(code)
    }

    fn resolve_warehouse(&self, code: &str, name: Option<&str>) -> LedgerResult<Warehouse> {
        (**self).resolve_warehouse(code, name)
    }

    fn lookup_warehouse(&self, code: &str) -> LedgerResult<Option<Warehouse>> {
        (**self).lookup_warehouse(code)
    }
}
