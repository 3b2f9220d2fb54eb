use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use kardex_core::{ItemId, LedgerError, LedgerResult, UserId, WarehouseId};
use kardex_ledger::{
    AdjustmentTarget, Direction, EntryFilter, InventoryLogEntry, Item, Lot, LotDeduction,
    MovementKind, MovementMeta, NewItem, StockAdjustment, StockMovement, TransactionType,
    Warehouse, allocate_fifo,
};

use crate::master_data::MasterData;

use super::r#trait::{LegacyLedger, StockLedger, StockIssue, StockReceipt};

#[derive(Debug, Default)]
struct LedgerState {
    items: HashMap<ItemId, Item>,
    item_codes: HashMap<String, ItemId>,
    warehouses: HashMap<WarehouseId, Warehouse>,
    warehouse_codes: HashMap<String, WarehouseId>,
    lots: Vec<Lot>,
    entries: Vec<InventoryLogEntry>,
    movements: Vec<StockMovement>,
    adjustments: Vec<StockAdjustment>,
}

impl LedgerState {
    fn item_mut(&mut self, item_id: ItemId) -> LedgerResult<&mut Item> {
        self.items
            .get_mut(&item_id)
            .ok_or_else(|| LedgerError::not_found(format!("item {item_id}")))
    }

    fn ensure_item(&self, item_id: ItemId) -> LedgerResult<()> {
        if !self.items.contains_key(&item_id) {
            return Err(LedgerError::not_found(format!("item {item_id}")));
        }
        Ok(())
    }

    fn ensure_warehouse(&self, warehouse_id: WarehouseId) -> LedgerResult<()> {
        if !self.warehouses.contains_key(&warehouse_id) {
            return Err(LedgerError::not_found(format!("warehouse {warehouse_id}")));
        }
        Ok(())
    }

    fn lot_index(&self, item_id: ItemId, warehouse_id: WarehouseId) -> Option<usize> {
        self.lots
            .iter()
            .position(|l| l.item_id == item_id && l.warehouse_id == warehouse_id)
    }

    /// Find-or-create the lot for the pair (lazy creation on first movement).
    fn open_lot(&mut self, item_id: ItemId, warehouse_id: WarehouseId) -> usize {
        match self.lot_index(item_id, warehouse_id) {
            Some(idx) => idx,
            None => {
                self.lots.push(Lot::open(item_id, warehouse_id, Utc::now()));
                self.lots.len() - 1
            }
        }
    }

    fn lot_sum(&self, item_id: ItemId) -> i64 {
        self.lots
            .iter()
            .filter(|l| l.item_id == item_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Upsert the single `InitialStock` entry for (item, warehouse-or-none).
    fn upsert_initial_entry(
        &mut self,
        item_id: ItemId,
        warehouse_id: Option<WarehouseId>,
        balance: i64,
        meta: &MovementMeta,
    ) {
        let existing = self.entries.iter_mut().find(|e| {
            e.item_id == item_id
                && e.warehouse_id == warehouse_id
                && e.tx_type == TransactionType::InitialStock
        });
        match existing {
            Some(entry) => {
                entry.quantity = balance;
                entry.note = meta.note.clone();
            }
            None => {
                self.entries.push(InventoryLogEntry::record(
                    item_id,
                    warehouse_id,
                    Direction::In,
                    balance,
                    meta,
                ));
            }
        }
    }
}

/// In-memory stock ledger.
///
/// Intended for tests/dev. Not optimized for performance: one mutex guards
/// the whole state, so every operation is a serialized transaction, and the
/// plan-then-apply decrement path makes failure an atomic no-op for free.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::persistence("ledger state lock poisoned"))
    }
}

impl StockLedger for InMemoryLedgerStore {
    fn increment(&self, receipt: StockReceipt) -> LedgerResult<i64> {
        if receipt.quantity < 0 {
            return Err(LedgerError::validation(format!(
                "increment quantity must not be negative, got {}",
                receipt.quantity
            )));
        }

        let mut state = self.lock()?;
        state.ensure_item(receipt.item_id)?;
        state.ensure_warehouse(receipt.warehouse_id)?;

        let idx = state.open_lot(receipt.item_id, receipt.warehouse_id);
        if receipt.quantity > 0 {
            state.lots[idx].quantity += receipt.quantity;
            state.item_mut(receipt.item_id)?.stock += receipt.quantity;
            state.entries.push(InventoryLogEntry::record(
                receipt.item_id,
                Some(receipt.warehouse_id),
                Direction::In,
                receipt.quantity,
                &receipt.meta,
            ));
        }
        Ok(state.lots[idx].quantity)
    }

    fn decrement_fifo(&self, issue: StockIssue) -> LedgerResult<Vec<LotDeduction>> {
        let mut state = self.lock()?;
        state.ensure_item(issue.item_id)?;
        if let Some(warehouse_id) = issue.warehouse_id {
            state.ensure_warehouse(warehouse_id)?;
        }

        // Holding the state mutex stands in for the per-lot exclusive locks
        // of a database backend: no other operation can read or write any
        // candidate lot until this transaction is over.
        let candidates: Vec<Lot> = state
            .lots
            .iter()
            .filter(|l| {
                l.item_id == issue.item_id
                    && issue.warehouse_id.map_or(true, |w| l.warehouse_id == w)
            })
            .cloned()
            .collect();

        let plan = allocate_fifo(&candidates, issue.quantity)?;

        for deduction in &plan {
            if let Some(lot) = state.lots.iter_mut().find(|l| l.id == deduction.lot_id) {
                lot.quantity = deduction.remaining;
            }
            state.entries.push(InventoryLogEntry::record(
                issue.item_id,
                Some(deduction.warehouse_id),
                Direction::Out,
                deduction.taken,
                &issue.meta,
            ));
        }
        state.item_mut(issue.item_id)?.stock -= issue.quantity;

        Ok(plan)
    }

    fn set_initial_stock(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: i64,
        meta: MovementMeta,
    ) -> LedgerResult<i64> {
        if quantity < 0 {
            return Err(LedgerError::validation(format!(
                "initial stock must not be negative, got {quantity}"
            )));
        }

        let mut state = self.lock()?;
        state.ensure_item(item_id)?;
        state.ensure_warehouse(warehouse_id)?;

        let idx = state.open_lot(item_id, warehouse_id);
        let delta = quantity - state.lots[idx].quantity;
        state.lots[idx].quantity = quantity;
        state.item_mut(item_id)?.stock += delta;
        state.upsert_initial_entry(item_id, Some(warehouse_id), quantity, &meta);

        Ok(delta)
    }

    fn adjust_aggregate(
        &self,
        item_id: ItemId,
        delta: i64,
        meta: MovementMeta,
    ) -> LedgerResult<i64> {
        let mut state = self.lock()?;
        let current = state.item_mut(item_id)?.stock;
        if delta == 0 {
            return Ok(current);
        }

        let next = current + delta;
        if next < 0 {
            return Err(LedgerError::insufficient(current, -delta));
        }

        state.item_mut(item_id)?.stock = next;
        let direction = if delta > 0 { Direction::In } else { Direction::Out };
        state.entries.push(InventoryLogEntry::record(
            item_id,
            None,
            direction,
            delta.abs(),
            &meta,
        ));

        Ok(next)
    }

    fn total_for(&self, item_id: ItemId) -> LedgerResult<i64> {
        let state = self.lock()?;
        state.ensure_item(item_id)?;
        Ok(state.lot_sum(item_id))
    }

    fn aggregate_for(&self, item_id: ItemId) -> LedgerResult<i64> {
        let state = self.lock()?;
        state
            .items
            .get(&item_id)
            .map(|i| i.stock)
            .ok_or_else(|| LedgerError::not_found(format!("item {item_id}")))
    }

    fn reconcile(&self, item_id: ItemId) -> LedgerResult<i64> {
        let mut state = self.lock()?;
        let sum = state.lot_sum(item_id);
        state.item_mut(item_id)?.stock = sum;
        Ok(sum)
    }

    fn lots_for(&self, item_id: ItemId) -> LedgerResult<Vec<Lot>> {
        let state = self.lock()?;
        state.ensure_item(item_id)?;
        let mut lots: Vec<Lot> = state
            .lots
            .iter()
            .filter(|l| l.item_id == item_id)
            .cloned()
            .collect();
        lots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(lots)
    }

    fn entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<InventoryLogEntry>> {
        let state = self.lock()?;
        Ok(state
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }
}

impl LegacyLedger for InMemoryLedgerStore {
    fn apply_initial_balance(
        &self,
        item_id: ItemId,
        quantity: i64,
        note: Option<String>,
        user_id: Option<UserId>,
    ) -> LedgerResult<i64> {
        if quantity < 0 {
            return Err(LedgerError::validation(format!(
                "initial balance must not be negative, got {quantity}"
            )));
        }

        let mut state = self.lock()?;
        let current_stock = state.item_mut(item_id)?.stock;

        let old = state
            .movements
            .iter()
            .find(|m| m.item_id == item_id && m.kind == MovementKind::InitialBalance)
            .map(|m| m.quantity)
            .unwrap_or(0);
        let delta = quantity - old;
        if delta == 0 {
            return Ok(0);
        }
        if current_stock + delta < 0 {
            return Err(LedgerError::insufficient(current_stock, -delta));
        }

        match state
            .movements
            .iter_mut()
            .find(|m| m.item_id == item_id && m.kind == MovementKind::InitialBalance)
        {
            Some(movement) => {
                movement.quantity = quantity;
                movement.note = note.clone();
                movement.updated_at = Utc::now();
            }
            None => {
                let mut movement =
                    StockMovement::new(item_id, MovementKind::InitialBalance, quantity);
                movement.note = note.clone();
                state.movements.push(movement);
            }
        }

        state.item_mut(item_id)?.stock = current_stock + delta;

        let mut meta = MovementMeta::now(TransactionType::InitialStock);
        meta.note = note;
        meta.user_id = user_id;
        state.upsert_initial_entry(item_id, None, quantity, &meta);

        Ok(delta)
    }

    fn record_movement(&self, movement: StockMovement) -> LedgerResult<()> {
        if movement.kind == MovementKind::InitialBalance {
            return Err(LedgerError::validation(
                "initial balances go through apply_initial_balance",
            ));
        }
        let mut state = self.lock()?;
        state.ensure_item(movement.item_id)?;
        state.movements.push(movement);
        Ok(())
    }

    fn movements_for(&self, item_id: ItemId) -> LedgerResult<Vec<StockMovement>> {
        let state = self.lock()?;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.item_id == item_id)
            .cloned()
            .collect())
    }

    fn record_adjustment(&self, adjustment: StockAdjustment) -> LedgerResult<()> {
        if adjustment.delta == 0 {
            return Err(LedgerError::validation("adjustment delta must not be zero"));
        }
        if adjustment.reason.trim().is_empty() {
            return Err(LedgerError::validation("adjustment reason must not be empty"));
        }
        let mut state = self.lock()?;
        state.adjustments.push(adjustment);
        Ok(())
    }

    fn adjustments_for(&self, target: &AdjustmentTarget) -> LedgerResult<Vec<StockAdjustment>> {
        let state = self.lock()?;
        Ok(state
            .adjustments
            .iter()
            .filter(|a| a.target == *target)
            .cloned()
            .collect())
    }
}

impl MasterData for InMemoryLedgerStore {
    fn resolve_item(&self, code: &str, attrs: &NewItem) -> LedgerResult<Item> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LedgerError::validation("item code must not be empty"));
        }

        let mut state = self.lock()?;
        if let Some(item) = state.item_codes.get(code).and_then(|id| state.items.get(id)) {
            return Ok(item.clone());
        }

        let mut item = Item::new(code, attrs.name.clone().unwrap_or_else(|| code.to_string()));
        item.category = attrs.category.clone();
        item.unit = attrs.unit.clone();
        state.item_codes.insert(code.to_string(), item.id);
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    fn lookup_item(&self, code: &str) -> LedgerResult<Option<Item>> {
        let state = self.lock()?;
        Ok(state
            .item_codes
            .get(code.trim())
            .and_then(|id| state.items.get(id))
            .cloned())
    }

    fn resolve_warehouse(&self, code: &str, name: Option<&str>) -> LedgerResult<Warehouse> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LedgerError::validation("warehouse code must not be empty"));
        }

        let mut state = self.lock()?;
        if let Some(id) = state.warehouse_codes.get(code) {
            if let Some(warehouse) = state.warehouses.get(id) {
                return Ok(warehouse.clone());
            }
        }

        let warehouse = Warehouse::new(code, name.unwrap_or(code));
        state.warehouse_codes.insert(code.to_string(), warehouse.id);
        state.warehouses.insert(warehouse.id, warehouse.clone());
        Ok(warehouse)
    }

    fn lookup_warehouse(&self, code: &str) -> LedgerResult<Option<Warehouse>> {
        let state = self.lock()?;
        Ok(state
            .warehouse_codes
            .get(code.trim())
            .and_then(|id| state.warehouses.get(id))
            .cloned())
    }
}
