//! Lots: one quantity record per (item, warehouse) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kardex_core::{Entity, ItemId, LotId, WarehouseId};

/// One quantity record per (item, warehouse) pair, treated as the allocation
/// unit in FIFO decrement.
///
/// Lots are created lazily on the first movement for a pair, are never
/// deleted, and may sit at zero. `quantity` is never negative; the store
/// enforces this by planning a whole decrement before persisting any part
/// of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

impl Lot {
    pub fn open(item_id: ItemId, warehouse_id: WarehouseId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: LotId::new(),
            item_id,
            warehouse_id,
            quantity: 0,
            created_at,
        }
    }

    pub fn has_stock(&self) -> bool {
        self.quantity > 0
    }
}

impl Entity for Lot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
