//! FIFO allocation planning (pure decision logic).
//!
//! Planning is separated from persistence: the store collects and locks the
//! candidate lots inside a transaction, this module decides how to deplete
//! them, and the store persists the plan. The planner mutates nothing, so a
//! failed plan is automatically an atomic no-op.

use kardex_core::{LedgerError, LedgerResult, LotId, WarehouseId};

use crate::lot::Lot;

/// A planned deduction against one lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDeduction {
    pub lot_id: LotId,
    pub warehouse_id: WarehouseId,
    /// Units taken from this lot.
    pub taken: i64,
    /// Lot quantity after the deduction.
    pub remaining: i64,
}

/// Plan a FIFO depletion of `requested` units across `lots`.
///
/// Candidate order is lot creation time ascending, lot id as tie-break, so
/// the oldest-arrived stock is consumed first and the depletion order is
/// deterministic and auditable. Lots already at zero contribute nothing.
///
/// Fails with `InsufficientStock` when the candidates cannot cover the
/// demand, and with `Validation` for a non-positive request. On failure no
/// deduction is planned.
pub fn allocate_fifo(lots: &[Lot], requested: i64) -> LedgerResult<Vec<LotDeduction>> {
    if requested <= 0 {
        return Err(LedgerError::validation(format!(
            "requested quantity must be positive, got {requested}"
        )));
    }

    let mut candidates: Vec<&Lot> = lots.iter().filter(|l| l.has_stock()).collect();
    candidates.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let available: i64 = candidates.iter().map(|l| l.quantity).sum();
    if available < requested {
        return Err(LedgerError::insufficient(available, requested));
    }

    let mut remaining_demand = requested;
    let mut plan = Vec::new();
    for lot in candidates {
        if remaining_demand == 0 {
            break;
        }
        let taken = remaining_demand.min(lot.quantity);
        plan.push(LotDeduction {
            lot_id: lot.id,
            warehouse_id: lot.warehouse_id,
            taken,
            remaining: lot.quantity - taken,
        });
        remaining_demand -= taken;
    }

    Ok(plan)
}
