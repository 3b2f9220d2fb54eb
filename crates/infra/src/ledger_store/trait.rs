use std::sync::Arc;

use kardex_core::{ItemId, LedgerResult, UserId, WarehouseId};
use kardex_ledger::{
    AdjustmentTarget, EntryFilter, InventoryLogEntry, Lot, LotDeduction, MovementMeta,
    StockAdjustment, StockMovement,
};

/// A stock receipt: `quantity` absolute units into one (item, warehouse) lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockReceipt {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub meta: MovementMeta,
}

/// A stock issue: `quantity` absolute units out of an item's lots, FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockIssue {
    pub item_id: ItemId,
    /// When set, only that warehouse's lot is a candidate (warehouse-scoped
    /// adjustments). When `None`, allocation runs FIFO across all warehouses.
    pub warehouse_id: Option<WarehouseId>,
    pub quantity: i64,
    pub meta: MovementMeta,
}

/// The warehouse-aware stock ledger.
///
/// One lot per (item, warehouse) pair, an append-only audit log, and the
/// cached per-item aggregate. The lots are the source of truth; the aggregate
/// is a cache every operation keeps in step.
///
/// ## Transactional contract
///
/// Each operation is one transaction: the quantity change, its audit entry,
/// and the aggregate update commit together or not at all. A failed operation
/// (insufficient stock, validation, storage) leaves no record modified.
///
/// ## Locking
///
/// `decrement_fifo` must acquire exclusive locks on every candidate lot in a
/// fixed order (creation time ascending, id as tie-break) before reading
/// quantities, so two concurrent decrements cannot both see the same units as
/// available. `total_for` reads without locks and is for reporting only;
/// allocation decisions always re-lock.
pub trait StockLedger: Send + Sync {
    /// Find-or-create the lot for the pair and atomically add `quantity`.
    ///
    /// Never fails for `quantity >= 0` (a zero receipt only materializes the
    /// lot and writes no audit entry); `Validation` for negative quantity.
    /// Returns the lot quantity after the receipt.
    fn increment(&self, receipt: StockReceipt) -> LedgerResult<i64>;

    /// Deplete `quantity` units from the item's lots, oldest lot first.
    ///
    /// All-or-nothing: when the candidates cannot cover the demand the call
    /// fails with `InsufficientStock { available, requested }` and no record
    /// changes. On success each partial deduction is persisted and audited
    /// with its own `Out` entry. A scoped issue against a warehouse that does
    /// not exist fails with `RecordNotFound`, not `InsufficientStock`.
    fn decrement_fifo(&self, issue: StockIssue) -> LedgerResult<Vec<LotDeduction>>;

    /// Idempotent opening balance for one (item, warehouse) pair.
    ///
    /// Sets the lot to `quantity` (not adds), upserts the pair's single
    /// `InitialStock` audit entry to reflect the latest value, and moves the
    /// aggregate by the old/new delta. Repeating the same balance is a no-op.
    /// Returns the delta.
    fn set_initial_stock(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: i64,
        meta: MovementMeta,
    ) -> LedgerResult<i64>;

    /// Warehouse-agnostic aggregate adjustment.
    ///
    /// Moves the item's cached total by `delta` without touching lots, but
    /// still writes an audit entry (with no warehouse). A deliberate
    /// simplification for items kept outside the warehouse dimension; fails
    /// with `InsufficientStock` rather than letting the total go negative.
    /// A zero delta is a no-op with no entry. Returns the new total.
    fn adjust_aggregate(&self, item_id: ItemId, delta: i64, meta: MovementMeta)
    -> LedgerResult<i64>;

    /// Unlocked lot sum for the item (reporting, not allocation).
    fn total_for(&self, item_id: ItemId) -> LedgerResult<i64>;

    /// The cached aggregate as currently stored on the item.
    fn aggregate_for(&self, item_id: ItemId) -> LedgerResult<i64>;

    /// Recompute the aggregate from the lots and overwrite the cache.
    ///
    /// Repairs drift introduced by the warehouse-agnostic path. Returns the
    /// repaired value.
    fn reconcile(&self, item_id: ItemId) -> LedgerResult<i64>;

    /// The item's lots in FIFO order.
    fn lots_for(&self, item_id: ItemId) -> LedgerResult<Vec<Lot>>;

    /// Audit entries matching the filter, oldest first.
    fn entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<InventoryLogEntry>>;
}

/// The legacy per-item ledger (no warehouse dimension).
pub trait LegacyLedger: Send + Sync {
    /// Find-or-update the item's `InitialBalance` movement row, move the
    /// aggregate by the old/new delta, and upsert the item's warehouse-less
    /// `InitialStock` audit entry — one transaction. Returns the delta.
    fn apply_initial_balance(
        &self,
        item_id: ItemId,
        quantity: i64,
        note: Option<String>,
        user_id: Option<UserId>,
    ) -> LedgerResult<i64>;

    /// Append a non-balance movement row (no aggregate effect).
    fn record_movement(&self, movement: StockMovement) -> LedgerResult<()>;

    /// Movement rows for an item, oldest first.
    fn movements_for(&self, item_id: ItemId) -> LedgerResult<Vec<StockMovement>>;

    /// Append an immutable correction record.
    fn record_adjustment(&self, adjustment: StockAdjustment) -> LedgerResult<()>;

    /// Correction records for one target, oldest first.
    fn adjustments_for(&self, target: &AdjustmentTarget) -> LedgerResult<Vec<StockAdjustment>>;
}

impl<S> StockLedger for Arc<S>
where
    S: StockLedger + ?Sized,
{
    fn increment(&self, receipt: StockReceipt) -> LedgerResult<i64> {
        (**self).increment(receipt)
    }

    fn decrement_fifo(&self, issue: StockIssue) -> LedgerResult<Vec<LotDeduction>> {
        (**self).decrement_fifo(issue)
    }

    fn set_initial_stock(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: i64,
        meta: MovementMeta,
    ) -> LedgerResult<i64> {
        (**self).set_initial_stock(item_id, warehouse_id, quantity, meta)
    }

    fn adjust_aggregate(
        &self,
        item_id: ItemId,
        delta: i64,
        meta: MovementMeta,
    ) -> LedgerResult<i64> {
        (**self).adjust_aggregate(item_id, delta, meta)
    }

    fn total_for(&self, item_id: ItemId) -> LedgerResult<i64> {
        (**self).total_for(item_id)
    }

    fn aggregate_for(&self, item_id: ItemId) -> LedgerResult<i64> {
        (**self).aggregate_for(item_id)
    }

    fn reconcile(&self, item_id: ItemId) -> LedgerResult<i64> {
        (**self).reconcile(item_id)
    }

    fn lots_for(&self, item_id: ItemId) -> LedgerResult<Vec<Lot>> {
        (**self).lots_for(item_id)
    }

    fn entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<InventoryLogEntry>> {
        (**self).entries(filter)
    }
}

impl<S> LegacyLedger for Arc<S>
where
    S: LegacyLedger + ?Sized,
{
    fn apply_initial_balance(
        &self,
        item_id: ItemId,
        quantity: i64,
        note: Option<String>,
        user_id: Option<UserId>,
    ) -> LedgerResult<i64> {
        (**self).apply_initial_balance(item_id, quantity, note, user_id)
    }

    fn record_movement(&self, movement: StockMovement) -> LedgerResult<()> {
        (**self).record_movement(movement)
    }

    fn movements_for(&self, item_id: ItemId) -> LedgerResult<Vec<StockMovement>> {
        (**self).movements_for(item_id)
    }

    fn record_adjustment(&self, adjustment: StockAdjustment) -> LedgerResult<()> {
        (**self).record_adjustment(adjustment)
    }

    fn adjustments_for(&self, target: &AdjustmentTarget) -> LedgerResult<Vec<StockAdjustment>> {
        (**self).adjustments_for(target)
    }
}
