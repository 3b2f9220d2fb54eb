//! Legacy per-item ledger types (no warehouse dimension).
//!
//! Some import flows still write a simpler, item-only movement ledger in
//! parallel with the warehouse-aware path. Its initial-balance rows follow
//! the same find-or-update discipline as `InitialStock` log entries, so
//! re-running an import converges instead of duplicating history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kardex_core::{AdjustmentId, Entity, ItemId, MaterialId, MovementId, ProductId, UserId};

/// Kind of a legacy movement row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Opening balance ("Saldo Awal" rows in the import sheets). At most one
    /// per item; re-imports update it in place.
    InitialBalance,
    Inbound,
    Outbound,
}

/// Per-item movement record in the legacy ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub item_id: ItemId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn new(item_id: ItemId, kind: MovementKind, quantity: i64) -> Self {
        let now = Utc::now();
        Self {
            id: MovementId::new(),
            item_id,
            kind,
            quantity,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// The concrete entity a legacy adjustment corrected.
///
/// A tagged variant instead of a dynamic class-name + id pair: each variant
/// carries a concretely typed reference, so no runtime type resolution is
/// needed to follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AdjustmentTarget {
    Item(ItemId),
    Product(ProductId),
    Material(MaterialId),
}

/// Immutable correction record in the legacy ledger.
///
/// Records the signed delta applied to whichever entity was corrected.
/// Append-only: never updated or deleted once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub id: AdjustmentId,
    pub target: AdjustmentTarget,
    /// Signed quantity change.
    pub delta: i64,
    pub reason: String,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl StockAdjustment {
    pub fn new(target: AdjustmentTarget, delta: i64, reason: impl Into<String>) -> Self {
        Self {
            id: AdjustmentId::new(),
            target,
            delta,
            reason: reason.into(),
            user_id: None,
            created_at: Utc::now(),
        }
    }
}

impl Entity for StockAdjustment {
    type Id = AdjustmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_target_serializes_as_tagged_variant() {
        let target = AdjustmentTarget::Item(ItemId::new());
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["kind"], "item");

        let back: AdjustmentTarget = serde_json::from_value(json).unwrap();
        assert_eq!(back, target);
    }
}
