//! Audit-log entries and the movement taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kardex_core::{EntryId, ItemId, UserId, WarehouseId};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Apply the direction's sign to an absolute quantity.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            Direction::In => quantity,
            Direction::Out => -quantity,
        }
    }
}

/// Business reason for a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Production,
    Sale,
    Usage,
    Adjustment,
    TransferIn,
    TransferOut,
    /// Opening balance from a bulk import. The only type whose log entry is
    /// upserted per (item, warehouse) instead of appended, so repeated import
    /// runs converge instead of accumulating history.
    InitialStock,
}

/// Kind of business document a movement originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    SalesOrder,
    PurchaseOrder,
    ProductionOrder,
    Invoice,
    DeliveryNote,
    ImportBatch,
}

/// Typed reference to the originating business document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub kind: DocumentKind,
    pub doc_id: Uuid,
    /// Human-readable document number (e.g. "SO-2024-0012").
    pub number: String,
}

/// Metadata shared by every movement: why it happened, for whom, and any
/// document it traces back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementMeta {
    pub tx_type: TransactionType,
    pub document: Option<DocumentRef>,
    pub division: Option<String>,
    pub note: Option<String>,
    pub user_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

impl MovementMeta {
    /// Metadata stamped with the current time and no optional context.
    pub fn now(tx_type: TransactionType) -> Self {
        Self {
            tx_type,
            document: None,
            division: None,
            note: None,
            user_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_document(mut self, document: DocumentRef) -> Self {
        self.document = Some(document);
        self
    }
}

/// Immutable audit event: one per visible stock mutation.
///
/// `quantity` is signed by direction (positive for `In`, negative for `Out`).
/// `warehouse_id` is `None` for the warehouse-agnostic aggregate path, where
/// an item's cached total is adjusted without touching lots.
///
/// Append-only, with one documented exception: the single `InitialStock`
/// entry per (item, warehouse) is updated in place on repeated imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLogEntry {
    pub id: EntryId,
    pub occurred_at: DateTime<Utc>,
    pub item_id: ItemId,
    pub warehouse_id: Option<WarehouseId>,
    /// Signed by direction.
    pub quantity: i64,
    pub direction: Direction,
    pub tx_type: TransactionType,
    pub document: Option<DocumentRef>,
    pub division: Option<String>,
    pub note: Option<String>,
    pub user_id: Option<UserId>,
}

impl InventoryLogEntry {
    /// Build an entry for a movement of `quantity` absolute units.
    pub fn record(
        item_id: ItemId,
        warehouse_id: Option<WarehouseId>,
        direction: Direction,
        quantity: i64,
        meta: &MovementMeta,
    ) -> Self {
        Self {
            id: EntryId::new(),
            occurred_at: meta.occurred_at,
            item_id,
            warehouse_id,
            quantity: direction.signed(quantity),
            direction,
            tx_type: meta.tx_type,
            document: meta.document.clone(),
            division: meta.division.clone(),
            note: meta.note.clone(),
            user_id: meta.user_id,
        }
    }
}

/// Reporting filter over the audit log.
///
/// All fields are conjunctive; a default filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub item_id: Option<ItemId>,
    pub warehouse_id: Option<WarehouseId>,
    pub direction: Option<Direction>,
    pub tx_type: Option<TransactionType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EntryFilter {
    pub fn for_item(item_id: ItemId) -> Self {
        Self {
            item_id: Some(item_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &InventoryLogEntry) -> bool {
        if let Some(item_id) = self.item_id {
            if entry.item_id != item_id {
                return false;
            }
        }
        if let Some(warehouse_id) = self.warehouse_id {
            if entry.warehouse_id != Some(warehouse_id) {
                return false;
            }
        }
        if let Some(direction) = self.direction {
            if entry.direction != direction {
                return false;
            }
        }
        if let Some(tx_type) = self.tx_type {
            if entry.tx_type != tx_type {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.occurred_at > to {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_quantity_follows_direction() {
        assert_eq!(Direction::In.signed(25), 25);
        assert_eq!(Direction::Out.signed(25), -25);
    }

    #[test]
    fn filter_is_conjunctive() {
        let item_id = ItemId::new();
        let warehouse_id = WarehouseId::new();
        let meta = MovementMeta::now(TransactionType::Sale);
        let entry =
            InventoryLogEntry::record(item_id, Some(warehouse_id), Direction::Out, 10, &meta);

        assert!(EntryFilter::for_item(item_id).matches(&entry));
        assert!(
            EntryFilter {
                item_id: Some(item_id),
                direction: Some(Direction::Out),
                tx_type: Some(TransactionType::Sale),
                ..EntryFilter::default()
            }
            .matches(&entry)
        );
        assert!(
            !EntryFilter {
                item_id: Some(item_id),
                direction: Some(Direction::In),
                ..EntryFilter::default()
            }
            .matches(&entry)
        );
        assert!(!EntryFilter::for_item(ItemId::new()).matches(&entry));
    }

    #[test]
    fn date_range_bounds_are_inclusive() {
        let meta = MovementMeta::now(TransactionType::Purchase);
        let entry = InventoryLogEntry::record(ItemId::new(), None, Direction::In, 5, &meta);

        let filter = EntryFilter {
            from: Some(entry.occurred_at),
            to: Some(entry.occurred_at),
            ..EntryFilter::default()
        };
        assert!(filter.matches(&entry));

        let later = EntryFilter {
            from: Some(entry.occurred_at + chrono::Duration::seconds(1)),
            ..EntryFilter::default()
        };
        assert!(!later.matches(&entry));
    }
}
