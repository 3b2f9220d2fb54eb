//! Item and warehouse master records.

use serde::{Deserialize, Serialize};

use kardex_core::{Entity, ItemId, WarehouseId};

/// Inventory item master record.
///
/// `stock` is the denormalized total across all warehouses. It is a cache,
/// not the source of truth: the lots are authoritative, and every
/// lot-touching write path updates `stock` inside the same transaction.
/// `reconcile` on the store recomputes it from the lots when a
/// warehouse-agnostic path has let it drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Natural key used by collaborators (imports, order flows).
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    /// Cached aggregate quantity across all warehouses.
    pub stock: i64,
}

impl Item {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            code: code.into(),
            name: name.into(),
            category: None,
            unit: None,
            stock: 0,
        }
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Attributes supplied when an unknown item code is first seen.
///
/// Master-data resolution is lookup-or-create: collaborators hand over
/// whatever descriptive fields the source row carried, and the item is
/// created once with them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
}

/// Warehouse reference record (immutable for the ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub code: String,
    pub name: String,
}

impl Warehouse {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: WarehouseId::new(),
            code: code.into(),
            name: name.into(),
        }
    }
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
