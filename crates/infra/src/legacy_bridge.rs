//! Bridge to the legacy per-item ledger.
//!
//! Older callers track stock per item only, with no warehouse dimension:
//! one `InitialBalance` movement row per item plus append-only adjustment
//! records. The bridge keeps that surface alive against the same store the
//! warehouse-aware ledger uses, so both views stay consistent on the shared
//! aggregate.

use tracing::{info, instrument};

use kardex_core::{ItemId, LedgerError, LedgerResult, UserId};
use kardex_ledger::{AdjustmentTarget, StockAdjustment, StockMovement};

use crate::ledger_store::LegacyLedger;

#[derive(Debug, Clone)]
pub struct LegacyLedgerBridge<S> {
    store: S,
}

impl<S> LegacyLedgerBridge<S>
where
    S: LegacyLedger,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Set an item's opening balance, converging on repeat.
    ///
    /// The movement row is upserted and the item aggregate moves by the
    /// old/new delta, all in one store transaction. Returns the delta.
    #[instrument(skip(self, note), fields(item_id = %item_id, quantity), err)]
    pub fn apply_initial_balance(
        &self,
        item_id: ItemId,
        quantity: i64,
        note: Option<String>,
        user_id: Option<UserId>,
    ) -> LedgerResult<i64> {
        let delta = self
            .store
            .apply_initial_balance(item_id, quantity, note, user_id)?;
        info!(item_id = %item_id, delta, "initial balance applied");
        Ok(delta)
    }

    /// Append an inbound or outbound movement row.
    ///
    /// Movement rows are history only; they never touch the aggregate.
    /// Initial balances must go through [`Self::apply_initial_balance`].
    #[instrument(skip(self, movement), fields(item_id = %movement.item_id, kind = ?movement.kind), err)]
    pub fn record_movement(&self, movement: StockMovement) -> LedgerResult<()> {
        if movement.quantity <= 0 {
            return Err(LedgerError::validation(format!(
                "movement quantity must be positive, got {}",
                movement.quantity
            )));
        }
        self.store.record_movement(movement)
    }

    pub fn movements_for(&self, item_id: ItemId) -> LedgerResult<Vec<StockMovement>> {
        self.store.movements_for(item_id)
    }

    /// Append an immutable correction record against an item, product, or
    /// material. Corrections are never edited; a mistake gets a compensating
    /// record.
    #[instrument(skip(self, reason), fields(target = ?target, delta), err)]
    pub fn record_adjustment(
        &self,
        target: AdjustmentTarget,
        delta: i64,
        reason: impl Into<String>,
        user_id: Option<UserId>,
    ) -> LedgerResult<StockAdjustment> {
        let mut adjustment = StockAdjustment::new(target, delta, reason.into());
        adjustment.user_id = user_id;
        self.store.record_adjustment(adjustment.clone())?;
        info!(adjustment_id = %adjustment.id, "adjustment recorded");
        Ok(adjustment)
    }

    pub fn adjustments_for(&self, target: &AdjustmentTarget) -> LedgerResult<Vec<StockAdjustment>> {
        self.store.adjustments_for(target)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ledger_store::{InMemoryLedgerStore, StockLedger};
    use crate::master_data::MasterData;
    use kardex_ledger::{MovementKind, NewItem};

    fn bridge_with_item() -> (LegacyLedgerBridge<Arc<InMemoryLedgerStore>>, ItemId) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let item = store.resolve_item("PLT-7", &NewItem::default()).unwrap();
        (LegacyLedgerBridge::new(store), item.id)
    }

    #[test]
    fn initial_balance_converges_on_reapply() {
        let (bridge, item_id) = bridge_with_item();
        assert_eq!(
            bridge
                .apply_initial_balance(item_id, 120, None, None)
                .unwrap(),
            120
        );
        assert_eq!(
            bridge
                .apply_initial_balance(item_id, 120, None, None)
                .unwrap(),
            0
        );
        assert_eq!(
            bridge
                .apply_initial_balance(item_id, 90, None, None)
                .unwrap(),
            -30
        );
        assert_eq!(bridge.movements_for(item_id).unwrap().len(), 1);
    }

    #[test]
    fn movement_rows_do_not_move_the_aggregate() {
        let (bridge, item_id) = bridge_with_item();
        bridge
            .apply_initial_balance(item_id, 50, None, None)
            .unwrap();
        let mut outbound = StockMovement::new(item_id, MovementKind::Outbound, 10);
        outbound.note = Some("shipment".to_string());
        bridge.record_movement(outbound).unwrap();

        assert_eq!(bridge.store.aggregate_for(item_id).unwrap(), 50);
        assert_eq!(bridge.movements_for(item_id).unwrap().len(), 2);
    }

    #[test]
    fn non_positive_movement_is_rejected() {
        let (bridge, item_id) = bridge_with_item();
        let err = bridge
            .record_movement(StockMovement::new(item_id, MovementKind::Inbound, 0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn adjustments_accumulate_per_target() {
        let (bridge, item_id) = bridge_with_item();
        let target = AdjustmentTarget::Item(item_id);
        bridge
            .record_adjustment(target, -3, "damaged in transit", None)
            .unwrap();
        bridge
            .record_adjustment(target, 3, "reversal of damage writeoff", None)
            .unwrap();

        let records = bridge.adjustments_for(&target).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.iter().map(|a| a.delta).sum::<i64>(), 0);
    }
}
