//! Postgres-backed stock ledger implementation.
//!
//! This module provides a persistent ledger using PostgreSQL as the backing
//! storage. It enforces the transactional contract at the database level:
//! quantity change, audit entry, and aggregate update commit together, and
//! the FIFO decrement path locks candidate lots with `SELECT ... FOR UPDATE`
//! in (created_at, id) order before reading quantities.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE items (
//!     id       UUID PRIMARY KEY,
//!     code     TEXT NOT NULL UNIQUE,
//!     name     TEXT NOT NULL,
//!     category TEXT,
//!     unit     TEXT,
//!     stock    BIGINT NOT NULL DEFAULT 0
//! );
//!
//! CREATE TABLE warehouses (
//!     id   UUID PRIMARY KEY,
//!     code TEXT NOT NULL UNIQUE,
//!     name TEXT NOT NULL
//! );
//!
//! CREATE TABLE lots (
//!     id           UUID PRIMARY KEY,
//!     item_id      UUID NOT NULL REFERENCES items(id),
//!     warehouse_id UUID NOT NULL REFERENCES warehouses(id),
//!     quantity     BIGINT NOT NULL CHECK (quantity >= 0),
//!     created_at   TIMESTAMPTZ NOT NULL,
//!     UNIQUE (item_id, warehouse_id)
//! );
//!
//! CREATE TABLE inventory_log (
//!     id           UUID PRIMARY KEY,
//!     occurred_at  TIMESTAMPTZ NOT NULL,
//!     item_id      UUID NOT NULL REFERENCES items(id),
//!     warehouse_id UUID REFERENCES warehouses(id),
//!     quantity     BIGINT NOT NULL,
//!     direction    TEXT NOT NULL,
//!     tx_type      TEXT NOT NULL,
//!     doc_kind     TEXT,
//!     doc_id       UUID,
//!     doc_number   TEXT,
//!     division     TEXT,
//!     note         TEXT,
//!     user_id      UUID
//! );
//! -- one initial-stock entry per (item, warehouse-or-none)
//! CREATE UNIQUE INDEX inventory_log_initial_stock
//!     ON inventory_log (item_id, COALESCE(warehouse_id, '00000000-0000-0000-0000-000000000000'))
//!     WHERE tx_type = 'initial_stock';
//!
//! CREATE TABLE stock_movements (
//!     id         UUID PRIMARY KEY,
//!     item_id    UUID NOT NULL REFERENCES items(id),
//!     kind       TEXT NOT NULL,
//!     quantity   BIGINT NOT NULL,
//!     note       TEXT,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE UNIQUE INDEX stock_movements_initial_balance
//!     ON stock_movements (item_id) WHERE kind = 'initial_balance';
//!
//! CREATE TABLE stock_adjustments (
//!     id          UUID PRIMARY KEY,
//!     target_kind TEXT NOT NULL,
//!     target_id   UUID NOT NULL,
//!     delta       BIGINT NOT NULL,
//!     reason      TEXT NOT NULL,
//!     user_id     UUID,
//!     created_at  TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `LedgerError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (foreign key violation) | `23503` | `RecordNotFound` | Referenced item/warehouse id does not exist |
//! | Database (check constraint violation) | `23514` | `Persistence` | Lot went negative (prevented by planning; indicates a bug) |
//! | Database (other) | Any other | `Persistence` | Other database errors |
//! | PoolClosed / network / Other | N/A | `Persistence` | Connection failures etc. |
//!
//! ## Thread Safety
//!
//! `PostgresLedgerStore` is `Send + Sync` and can be shared across threads.
//! All operations use the SQLx connection pool, and every mutating method
//! runs inside one transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use kardex_core::{
    AdjustmentId, EntryId, ItemId, LedgerError, LedgerResult, LotId, MaterialId, MovementId,
    ProductId, UserId, WarehouseId,
};
use kardex_ledger::{
    AdjustmentTarget, Direction, DocumentKind, DocumentRef, EntryFilter, InventoryLogEntry, Item,
    Lot, LotDeduction, MovementKind, MovementMeta, NewItem, StockAdjustment, StockMovement,
    TransactionType, Warehouse, allocate_fifo,
};

use crate::master_data::MasterData;

use super::r#trait::{LegacyLedger, StockIssue, StockLedger, StockReceipt};

/// Postgres-backed stock ledger.
///
/// Mutating methods are `async` and each run in one database transaction.
/// The synchronous `StockLedger`/`LegacyLedger`/`MasterData` trait
/// implementations bridge into them via the ambient tokio runtime.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, receipt), fields(item_id = %receipt.item_id, warehouse_id = %receipt.warehouse_id, quantity = receipt.quantity), err)]
    pub async fn increment_stock(&self, receipt: StockReceipt) -> LedgerResult<i64> {
        if receipt.quantity < 0 {
            return Err(LedgerError::validation(format!(
                "increment quantity must not be negative, got {}",
                receipt.quantity
            )));
        }

        let mut tx = self.begin().await?;
        ensure_item(&mut tx, receipt.item_id).await?;
        ensure_warehouse(&mut tx, receipt.warehouse_id).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO lots (id, item_id, warehouse_id, quantity, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (item_id, warehouse_id)
            DO UPDATE SET quantity = lots.quantity + EXCLUDED.quantity
            RETURNING quantity
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(receipt.item_id.as_uuid())
        .bind(receipt.warehouse_id.as_uuid())
        .bind(receipt.quantity)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_lot", e))?;

        let lot_quantity: i64 = row
            .try_get("quantity")
            .map_err(|e| map_sqlx_error("upsert_lot", e))?;

        if receipt.quantity > 0 {
            bump_item_stock(&mut tx, receipt.item_id, receipt.quantity).await?;
            let entry = InventoryLogEntry::record(
                receipt.item_id,
                Some(receipt.warehouse_id),
                Direction::In,
                receipt.quantity,
                &receipt.meta,
            );
            insert_entry(&mut tx, &entry).await?;
        }

        self.commit(tx).await?;
        Ok(lot_quantity)
    }

    #[instrument(skip(self, issue), fields(item_id = %issue.item_id, quantity = issue.quantity), err)]
    pub async fn decrement_stock_fifo(&self, issue: StockIssue) -> LedgerResult<Vec<LotDeduction>> {
        let mut tx = self.begin().await?;
        ensure_item(&mut tx, issue.item_id).await?;
        if let Some(warehouse_id) = issue.warehouse_id {
            ensure_warehouse(&mut tx, warehouse_id).await?;
        }

        // Lock every candidate lot, oldest first, before reading quantities.
        // Two concurrent decrements therefore serialize on the same lots and
        // cannot both see the same units as available.
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, warehouse_id, quantity, created_at
            FROM lots
            WHERE item_id = $1
              AND quantity > 0
              AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY created_at ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(issue.item_id.as_uuid())
        .bind(issue.warehouse_id.map(|w| *w.as_uuid()))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_lots", e))?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            candidates.push(lot_from_row(&row)?);
        }

        let plan = allocate_fifo(&candidates, issue.quantity)?;

        for deduction in &plan {
            sqlx::query("UPDATE lots SET quantity = $1 WHERE id = $2")
                .bind(deduction.remaining)
                .bind(deduction.lot_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("deduct_lot", e))?;

            let entry = InventoryLogEntry::record(
                issue.item_id,
                Some(deduction.warehouse_id),
                Direction::Out,
                deduction.taken,
                &issue.meta,
            );
            insert_entry(&mut tx, &entry).await?;
        }
        bump_item_stock(&mut tx, issue.item_id, -issue.quantity).await?;

        self.commit(tx).await?;
        Ok(plan)
    }

    #[instrument(skip(self, meta), fields(item_id = %item_id, warehouse_id = %warehouse_id, quantity), err)]
    pub async fn set_initial_stock_for(
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

        let mut tx = self.begin().await?;
        ensure_item(&mut tx, item_id).await?;
        ensure_warehouse(&mut tx, warehouse_id).await?;

        // The no-op DO UPDATE locks the existing row and returns its current
        // quantity; a fresh pair inserts at zero.
        let row = sqlx::query(
            r#"
            INSERT INTO lots (id, item_id, warehouse_id, quantity, created_at)
            VALUES ($1, $2, $3, 0, $4)
            ON CONFLICT (item_id, warehouse_id)
            DO UPDATE SET quantity = lots.quantity
            RETURNING id, quantity
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(item_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_lot", e))?;

        let lot_id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("lock_lot", e))?;
        let old: i64 = row
            .try_get("quantity")
            .map_err(|e| map_sqlx_error("lock_lot", e))?;
        let delta = quantity - old;

        sqlx::query("UPDATE lots SET quantity = $1 WHERE id = $2")
            .bind(quantity)
            .bind(lot_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lot", e))?;

        if delta != 0 {
            bump_item_stock(&mut tx, item_id, delta).await?;
        }
        upsert_initial_entry(&mut tx, item_id, Some(warehouse_id), quantity, &meta).await?;

        self.commit(tx).await?;
        Ok(delta)
    }

    #[instrument(skip(self, meta), fields(item_id = %item_id, delta), err)]
    pub async fn adjust_aggregate_for(
        &self,
        item_id: ItemId,
        delta: i64,
        meta: MovementMeta,
    ) -> LedgerResult<i64> {
        let mut tx = self.begin().await?;
        let current = lock_item_stock(&mut tx, item_id).await?;
        if delta == 0 {
            self.commit(tx).await?;
            return Ok(current);
        }

        let next = current + delta;
        if next < 0 {
            return Err(LedgerError::insufficient(current, -delta));
        }

        sqlx::query("UPDATE items SET stock = $1 WHERE id = $2")
            .bind(next)
            .bind(item_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_item_stock", e))?;

        let direction = if delta > 0 { Direction::In } else { Direction::Out };
        let entry = InventoryLogEntry::record(item_id, None, direction, delta.abs(), &meta);
        insert_entry(&mut tx, &entry).await?;

        self.commit(tx).await?;
        Ok(next)
    }

    /// Unlocked lot sum; reporting only, allocation always re-locks.
    pub async fn lot_total(&self, item_id: ItemId) -> LedgerResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(quantity), 0)::bigint AS total FROM lots WHERE item_id = $1",
        )
        .bind(item_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("lot_total", e))?;
        row.try_get("total")
            .map_err(|e| map_sqlx_error("lot_total", e))
    }

    pub async fn item_stock(&self, item_id: ItemId) -> LedgerResult<i64> {
        let row = sqlx::query("SELECT stock FROM items WHERE id = $1")
            .bind(item_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("item_stock", e))?
            .ok_or_else(|| LedgerError::not_found(format!("item {item_id}")))?;
        row.try_get("stock")
            .map_err(|e| map_sqlx_error("item_stock", e))
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub async fn reconcile_item(&self, item_id: ItemId) -> LedgerResult<i64> {
        let mut tx = self.begin().await?;
        lock_item_stock(&mut tx, item_id).await?;

        let row = sqlx::query(
            "SELECT COALESCE(SUM(quantity), 0)::bigint AS total FROM lots WHERE item_id = $1",
        )
        .bind(item_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reconcile_sum", e))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| map_sqlx_error("reconcile_sum", e))?;

        sqlx::query("UPDATE items SET stock = $1 WHERE id = $2")
            .bind(total)
            .bind(item_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reconcile_set", e))?;

        self.commit(tx).await?;
        Ok(total)
    }

    pub async fn item_lots(&self, item_id: ItemId) -> LedgerResult<Vec<Lot>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, warehouse_id, quantity, created_at
            FROM lots
            WHERE item_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("item_lots", e))?;

        let mut lots = Vec::with_capacity(rows.len());
        for row in rows {
            lots.push(lot_from_row(&row)?);
        }
        Ok(lots)
    }

    pub async fn query_entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<InventoryLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, occurred_at, item_id, warehouse_id, quantity, direction, tx_type,
                   doc_kind, doc_id, doc_number, division, note, user_id
            FROM inventory_log
            WHERE ($1::uuid IS NULL OR item_id = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
              AND ($3::text IS NULL OR direction = $3)
              AND ($4::text IS NULL OR tx_type = $4)
              AND ($5::timestamptz IS NULL OR occurred_at >= $5)
              AND ($6::timestamptz IS NULL OR occurred_at <= $6)
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .bind(filter.item_id.map(|i| *i.as_uuid()))
        .bind(filter.warehouse_id.map(|w| *w.as_uuid()))
        .bind(filter.direction.map(direction_str))
        .bind(filter.tx_type.map(tx_type_str))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_entries", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(entry_from_row(&row)?);
        }
        Ok(entries)
    }

    #[instrument(skip(self, note), fields(item_id = %item_id, quantity), err)]
    pub async fn apply_initial_balance_for(
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

        let mut tx = self.begin().await?;
        let current_stock = lock_item_stock(&mut tx, item_id).await?;

        let existing = sqlx::query(
            r#"
            SELECT id, quantity FROM stock_movements
            WHERE item_id = $1 AND kind = 'initial_balance'
            FOR UPDATE
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_initial_balance", e))?;

        let old = match &existing {
            Some(row) => row
                .try_get::<i64, _>("quantity")
                .map_err(|e| map_sqlx_error("lock_initial_balance", e))?,
            None => 0,
        };
        let delta = quantity - old;
        if delta == 0 {
            self.commit(tx).await?;
            return Ok(0);
        }
        if current_stock + delta < 0 {
            return Err(LedgerError::insufficient(current_stock, -delta));
        }

        match existing {
            Some(row) => {
                let id: Uuid = row
                    .try_get("id")
                    .map_err(|e| map_sqlx_error("lock_initial_balance", e))?;
                sqlx::query(
                    "UPDATE stock_movements SET quantity = $1, note = $2, updated_at = $3 WHERE id = $4",
                )
                .bind(quantity)
                .bind(&note)
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_initial_balance", e))?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO stock_movements (id, item_id, kind, quantity, note, created_at, updated_at)
                    VALUES ($1, $2, 'initial_balance', $3, $4, $5, $5)
                    "#,
                )
                .bind(Uuid::now_v7())
                .bind(item_id.as_uuid())
                .bind(quantity)
                .bind(&note)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_initial_balance", e))?;
            }
        }

        sqlx::query("UPDATE items SET stock = $1 WHERE id = $2")
            .bind(current_stock + delta)
            .bind(item_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_item_stock", e))?;

        let mut meta = MovementMeta::now(TransactionType::InitialStock);
        meta.note = note;
        meta.user_id = user_id;
        upsert_initial_entry(&mut tx, item_id, None, quantity, &meta).await?;

        self.commit(tx).await?;
        Ok(delta)
    }

    pub async fn insert_movement(&self, movement: &StockMovement) -> LedgerResult<()> {
        if movement.kind == MovementKind::InitialBalance {
            return Err(LedgerError::validation(
                "initial balances go through apply_initial_balance",
            ));
        }
        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, item_id, kind, quantity, note, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.item_id.as_uuid())
        .bind(movement_kind_str(movement.kind))
        .bind(movement.quantity)
        .bind(&movement.note)
        .bind(movement.created_at)
        .bind(movement.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
        Ok(())
    }

    pub async fn item_movements(&self, item_id: ItemId) -> LedgerResult<Vec<StockMovement>> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_id, kind, quantity, note, created_at, updated_at
            FROM stock_movements
            WHERE item_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("item_movements", e))?;

        let mut movements = Vec::with_capacity(rows.len());
        for row in rows {
            movements.push(movement_from_row(&row)?);
        }
        Ok(movements)
    }

    pub async fn insert_adjustment(&self, adjustment: &StockAdjustment) -> LedgerResult<()> {
        if adjustment.delta == 0 {
            return Err(LedgerError::validation("adjustment delta must not be zero"));
        }
        if adjustment.reason.trim().is_empty() {
            return Err(LedgerError::validation("adjustment reason must not be empty"));
        }

        let (target_kind, target_id) = adjustment_target_parts(&adjustment.target);
        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (id, target_kind, target_id, delta, reason, user_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(adjustment.id.as_uuid())
        .bind(target_kind)
        .bind(target_id)
        .bind(adjustment.delta)
        .bind(&adjustment.reason)
        .bind(adjustment.user_id.map(|u| *u.as_uuid()))
        .bind(adjustment.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_adjustment", e))?;
        Ok(())
    }

    pub async fn target_adjustments(
        &self,
        target: &AdjustmentTarget,
    ) -> LedgerResult<Vec<StockAdjustment>> {
        let (target_kind, target_id) = adjustment_target_parts(target);
        let rows = sqlx::query(
            r#"
            SELECT id, target_kind, target_id, delta, reason, user_id, created_at
            FROM stock_adjustments
            WHERE target_kind = $1 AND target_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(target_kind)
        .bind(target_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("target_adjustments", e))?;

        let mut adjustments = Vec::with_capacity(rows.len());
        for row in rows {
            adjustments.push(adjustment_from_row(&row)?);
        }
        Ok(adjustments)
    }

    pub async fn resolve_item_by_code(&self, code: &str, attrs: &NewItem) -> LedgerResult<Item> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LedgerError::validation("item code must not be empty"));
        }

        sqlx::query(
            r#"
            INSERT INTO items (id, code, name, category, unit, stock)
            VALUES ($1, $2, $3, $4, $5, 0)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(code)
        .bind(attrs.name.as_deref().unwrap_or(code))
        .bind(&attrs.category)
        .bind(&attrs.unit)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;

        self.lookup_item_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::persistence(format!("item '{code}' vanished after upsert")))
    }

    pub async fn lookup_item_by_code(&self, code: &str) -> LedgerResult<Option<Item>> {
        let row = sqlx::query(
            "SELECT id, code, name, category, unit, stock FROM items WHERE code = $1",
        )
        .bind(code.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("lookup_item", e))?;
        row.map(|r| item_from_row(&r)).transpose()
    }

    pub async fn resolve_warehouse_by_code(
        &self,
        code: &str,
        name: Option<&str>,
    ) -> LedgerResult<Warehouse> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LedgerError::validation("warehouse code must not be empty"));
        }

        sqlx::query(
            r#"
            INSERT INTO warehouses (id, code, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(code)
        .bind(name.unwrap_or(code))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_warehouse", e))?;

        self.lookup_warehouse_by_code(code).await?.ok_or_else(|| {
            LedgerError::persistence(format!("warehouse '{code}' vanished after upsert"))
        })
    }

    pub async fn lookup_warehouse_by_code(&self, code: &str) -> LedgerResult<Option<Warehouse>> {
        let row = sqlx::query("SELECT id, code, name FROM warehouses WHERE code = $1")
            .bind(code.trim())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("lookup_warehouse", e))?;
        row.map(|r| warehouse_from_row(&r)).transpose()
    }

    async fn begin(&self) -> LedgerResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn commit(&self, tx: Transaction<'static, Postgres>) -> LedgerResult<()> {
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

async fn ensure_item(tx: &mut Transaction<'static, Postgres>, item_id: ItemId) -> LedgerResult<()> {
    let found = sqlx::query("SELECT 1 AS one FROM items WHERE id = $1")
        .bind(item_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_item", e))?;
    if found.is_none() {
        return Err(LedgerError::not_found(format!("item {item_id}")));
    }
    Ok(())
}

async fn ensure_warehouse(
    tx: &mut Transaction<'static, Postgres>,
    warehouse_id: WarehouseId,
) -> LedgerResult<()> {
    let found = sqlx::query("SELECT 1 AS one FROM warehouses WHERE id = $1")
        .bind(warehouse_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_warehouse", e))?;
    if found.is_none() {
        return Err(LedgerError::not_found(format!("warehouse {warehouse_id}")));
    }
    Ok(())
}

/// Lock the item row and return its cached stock.
async fn lock_item_stock(
    tx: &mut Transaction<'static, Postgres>,
    item_id: ItemId,
) -> LedgerResult<i64> {
    let row = sqlx::query("SELECT stock FROM items WHERE id = $1 FOR UPDATE")
        .bind(item_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_item", e))?
        .ok_or_else(|| LedgerError::not_found(format!("item {item_id}")))?;
    row.try_get("stock")
        .map_err(|e| map_sqlx_error("lock_item", e))
}

async fn bump_item_stock(
    tx: &mut Transaction<'static, Postgres>,
    item_id: ItemId,
    delta: i64,
) -> LedgerResult<()> {
    sqlx::query("UPDATE items SET stock = stock + $1 WHERE id = $2")
        .bind(delta)
        .bind(item_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("bump_item_stock", e))?;
    Ok(())
}

async fn insert_entry(
    tx: &mut Transaction<'static, Postgres>,
    entry: &InventoryLogEntry,
) -> LedgerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_log
            (id, occurred_at, item_id, warehouse_id, quantity, direction, tx_type,
             doc_kind, doc_id, doc_number, division, note, user_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.occurred_at)
    .bind(entry.item_id.as_uuid())
    .bind(entry.warehouse_id.map(|w| *w.as_uuid()))
    .bind(entry.quantity)
    .bind(direction_str(entry.direction))
    .bind(tx_type_str(entry.tx_type))
    .bind(entry.document.as_ref().map(|d| doc_kind_str(d.kind)))
    .bind(entry.document.as_ref().map(|d| d.doc_id))
    .bind(entry.document.as_ref().map(|d| d.number.clone()))
    .bind(&entry.division)
    .bind(&entry.note)
    .bind(entry.user_id.map(|u| *u.as_uuid()))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_entry", e))?;
    Ok(())
}

/// Update-then-insert upsert for the single initial-stock entry per
/// (item, warehouse-or-none); the partial unique index backstops races.
async fn upsert_initial_entry(
    tx: &mut Transaction<'static, Postgres>,
    item_id: ItemId,
    warehouse_id: Option<WarehouseId>,
    balance: i64,
    meta: &MovementMeta,
) -> LedgerResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE inventory_log SET quantity = $1, note = $2
        WHERE item_id = $3
          AND warehouse_id IS NOT DISTINCT FROM $4
          AND tx_type = 'initial_stock'
        "#,
    )
    .bind(balance)
    .bind(&meta.note)
    .bind(item_id.as_uuid())
    .bind(warehouse_id.map(|w| *w.as_uuid()))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_initial_entry", e))?;

    if updated.rows_affected() == 0 {
        let entry = InventoryLogEntry::record(item_id, warehouse_id, Direction::In, balance, meta);
        insert_entry(tx, &entry).await?;
    }
    Ok(())
}

fn lot_from_row(row: &PgRow) -> LedgerResult<Lot> {
    let read = |e: sqlx::Error| map_sqlx_error("lot_row", e);
    Ok(Lot {
        id: LotId::from_uuid(row.try_get("id").map_err(read)?),
        item_id: ItemId::from_uuid(row.try_get("item_id").map_err(read)?),
        warehouse_id: WarehouseId::from_uuid(row.try_get("warehouse_id").map_err(read)?),
        quantity: row.try_get("quantity").map_err(read)?,
        created_at: row.try_get("created_at").map_err(read)?,
    })
}

fn item_from_row(row: &PgRow) -> LedgerResult<Item> {
    let read = |e: sqlx::Error| map_sqlx_error("item_row", e);
    Ok(Item {
        id: ItemId::from_uuid(row.try_get("id").map_err(read)?),
        code: row.try_get("code").map_err(read)?,
        name: row.try_get("name").map_err(read)?,
        category: row.try_get("category").map_err(read)?,
        unit: row.try_get("unit").map_err(read)?,
        stock: row.try_get("stock").map_err(read)?,
    })
}

fn warehouse_from_row(row: &PgRow) -> LedgerResult<Warehouse> {
    let read = |e: sqlx::Error| map_sqlx_error("warehouse_row", e);
    Ok(Warehouse {
        id: WarehouseId::from_uuid(row.try_get("id").map_err(read)?),
        code: row.try_get("code").map_err(read)?,
        name: row.try_get("name").map_err(read)?,
    })
}

fn entry_from_row(row: &PgRow) -> LedgerResult<InventoryLogEntry> {
    let read = |e: sqlx::Error| map_sqlx_error("entry_row", e);

    let doc_kind: Option<String> = row.try_get("doc_kind").map_err(read)?;
    let doc_id: Option<Uuid> = row.try_get("doc_id").map_err(read)?;
    let doc_number: Option<String> = row.try_get("doc_number").map_err(read)?;
    let document = match (doc_kind, doc_id, doc_number) {
        (Some(kind), Some(doc_id), Some(number)) => Some(DocumentRef {
            kind: parse_doc_kind(&kind)?,
            doc_id,
            number,
        }),
        _ => None,
    };

    let direction: String = row.try_get("direction").map_err(read)?;
    let tx_type: String = row.try_get("tx_type").map_err(read)?;
    let warehouse_id: Option<Uuid> = row.try_get("warehouse_id").map_err(read)?;
    let user_id: Option<Uuid> = row.try_get("user_id").map_err(read)?;

    Ok(InventoryLogEntry {
        id: EntryId::from_uuid(row.try_get("id").map_err(read)?),
        occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at").map_err(read)?,
        item_id: ItemId::from_uuid(row.try_get("item_id").map_err(read)?),
        warehouse_id: warehouse_id.map(WarehouseId::from_uuid),
        quantity: row.try_get("quantity").map_err(read)?,
        direction: parse_direction(&direction)?,
        tx_type: parse_tx_type(&tx_type)?,
        document,
        division: row.try_get("division").map_err(read)?,
        note: row.try_get("note").map_err(read)?,
        user_id: user_id.map(UserId::from_uuid),
    })
}

fn movement_from_row(row: &PgRow) -> LedgerResult<StockMovement> {
    let read = |e: sqlx::Error| map_sqlx_error("movement_row", e);
    let kind: String = row.try_get("kind").map_err(read)?;
    Ok(StockMovement {
        id: MovementId::from_uuid(row.try_get("id").map_err(read)?),
        item_id: ItemId::from_uuid(row.try_get("item_id").map_err(read)?),
        kind: parse_movement_kind(&kind)?,
        quantity: row.try_get("quantity").map_err(read)?,
        note: row.try_get("note").map_err(read)?,
        created_at: row.try_get("created_at").map_err(read)?,
        updated_at: row.try_get("updated_at").map_err(read)?,
    })
}

fn adjustment_from_row(row: &PgRow) -> LedgerResult<StockAdjustment> {
    let read = |e: sqlx::Error| map_sqlx_error("adjustment_row", e);
    let target_kind: String = row.try_get("target_kind").map_err(read)?;
    let target_id: Uuid = row.try_get("target_id").map_err(read)?;
    let user_id: Option<Uuid> = row.try_get("user_id").map_err(read)?;
    Ok(StockAdjustment {
        id: AdjustmentId::from_uuid(row.try_get("id").map_err(read)?),
        target: parse_adjustment_target(&target_kind, target_id)?,
        delta: row.try_get("delta").map_err(read)?,
        reason: row.try_get("reason").map_err(read)?,
        user_id: user_id.map(UserId::from_uuid),
        created_at: row.try_get("created_at").map_err(read)?,
    })
}

fn direction_str(direction: Direction) -> &'static str {
    match direction {
        Direction::In => "in",
        Direction::Out => "out",
    }
}

fn parse_direction(s: &str) -> LedgerResult<Direction> {
    match s {
        "in" => Ok(Direction::In),
        "out" => Ok(Direction::Out),
        other => Err(LedgerError::persistence(format!(
            "unknown direction '{other}' in inventory_log"
        ))),
    }
}

fn tx_type_str(tx_type: TransactionType) -> &'static str {
    match tx_type {
        TransactionType::Purchase => "purchase",
        TransactionType::Production => "production",
        TransactionType::Sale => "sale",
        TransactionType::Usage => "usage",
        TransactionType::Adjustment => "adjustment",
        TransactionType::TransferIn => "transfer_in",
        TransactionType::TransferOut => "transfer_out",
        TransactionType::InitialStock => "initial_stock",
    }
}

fn parse_tx_type(s: &str) -> LedgerResult<TransactionType> {
    match s {
        "purchase" => Ok(TransactionType::Purchase),
        "production" => Ok(TransactionType::Production),
        "sale" => Ok(TransactionType::Sale),
        "usage" => Ok(TransactionType::Usage),
        "adjustment" => Ok(TransactionType::Adjustment),
        "transfer_in" => Ok(TransactionType::TransferIn),
        "transfer_out" => Ok(TransactionType::TransferOut),
        "initial_stock" => Ok(TransactionType::InitialStock),
        other => Err(LedgerError::persistence(format!(
            "unknown tx_type '{other}' in inventory_log"
        ))),
    }
}

fn doc_kind_str(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::SalesOrder => "sales_order",
        DocumentKind::PurchaseOrder => "purchase_order",
        DocumentKind::ProductionOrder => "production_order",
        DocumentKind::Invoice => "invoice",
        DocumentKind::DeliveryNote => "delivery_note",
        DocumentKind::ImportBatch => "import_batch",
    }
}

fn parse_doc_kind(s: &str) -> LedgerResult<DocumentKind> {
    match s {
        "sales_order" => Ok(DocumentKind::SalesOrder),
        "purchase_order" => Ok(DocumentKind::PurchaseOrder),
        "production_order" => Ok(DocumentKind::ProductionOrder),
        "invoice" => Ok(DocumentKind::Invoice),
        "delivery_note" => Ok(DocumentKind::DeliveryNote),
        "import_batch" => Ok(DocumentKind::ImportBatch),
        other => Err(LedgerError::persistence(format!(
            "unknown doc_kind '{other}' in inventory_log"
        ))),
    }
}

fn movement_kind_str(kind: MovementKind) -> &'static str {
    match kind {
        MovementKind::InitialBalance => "initial_balance",
        MovementKind::Inbound => "inbound",
        MovementKind::Outbound => "outbound",
    }
}

fn parse_movement_kind(s: &str) -> LedgerResult<MovementKind> {
    match s {
        "initial_balance" => Ok(MovementKind::InitialBalance),
        "inbound" => Ok(MovementKind::Inbound),
        "outbound" => Ok(MovementKind::Outbound),
        other => Err(LedgerError::persistence(format!(
            "unknown movement kind '{other}' in stock_movements"
        ))),
    }
}

fn adjustment_target_parts(target: &AdjustmentTarget) -> (&'static str, Uuid) {
    match target {
        AdjustmentTarget::Item(id) => ("item", *id.as_uuid()),
        AdjustmentTarget::Product(id) => ("product", *id.as_uuid()),
        AdjustmentTarget::Material(id) => ("material", *id.as_uuid()),
    }
}

fn parse_adjustment_target(kind: &str, id: Uuid) -> LedgerResult<AdjustmentTarget> {
    match kind {
        "item" => Ok(AdjustmentTarget::Item(ItemId::from_uuid(id))),
        "product" => Ok(AdjustmentTarget::Product(ProductId::from_uuid(id))),
        "material" => Ok(AdjustmentTarget::Material(MaterialId::from_uuid(id))),
        other => Err(LedgerError::persistence(format!(
            "unknown adjustment target kind '{other}'"
        ))),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            if code == "23503" {
                return LedgerError::not_found(format!(
                    "{operation}: referenced record does not exist ({db_err})"
                ));
            }
        }
    }
    LedgerError::persistence(format!("{operation}: {err}"))
}

/// Bridge the synchronous ledger traits onto the async pool.
///
/// The traits are synchronous, but Postgres operations require async. We use
/// `tokio::runtime::Handle` to run async code in a sync context; callers must
/// therefore be inside a tokio runtime.
fn block_on<F, T>(future: F) -> LedgerResult<T>
where
    F: std::future::Future<Output = LedgerResult<T>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        LedgerError::persistence(
            "PostgresLedgerStore requires an async runtime (tokio); \
             call from within a tokio runtime context",
        )
    })?;
    handle.block_on(future)
}

impl StockLedger for PostgresLedgerStore {
    fn increment(&self, receipt: StockReceipt) -> LedgerResult<i64> {
        block_on(self.increment_stock(receipt))
    }

    fn decrement_fifo(&self, issue: StockIssue) -> LedgerResult<Vec<LotDeduction>> {
        block_on(self.decrement_stock_fifo(issue))
    }

    fn set_initial_stock(
        &self,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: i64,
        meta: MovementMeta,
    ) -> LedgerResult<i64> {
        block_on(self.set_initial_stock_for(item_id, warehouse_id, quantity, meta))
    }

    fn adjust_aggregate(
        &self,
        item_id: ItemId,
        delta: i64,
        meta: MovementMeta,
    ) -> LedgerResult<i64> {
        block_on(self.adjust_aggregate_for(item_id, delta, meta))
    }

    fn total_for(&self, item_id: ItemId) -> LedgerResult<i64> {
        block_on(self.lot_total(item_id))
    }

    fn aggregate_for(&self, item_id: ItemId) -> LedgerResult<i64> {
        block_on(self.item_stock(item_id))
    }

    fn reconcile(&self, item_id: ItemId) -> LedgerResult<i64> {
        block_on(self.reconcile_item(item_id))
    }

    fn lots_for(&self, item_id: ItemId) -> LedgerResult<Vec<Lot>> {
        block_on(self.item_lots(item_id))
    }

    fn entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<InventoryLogEntry>> {
        block_on(self.query_entries(filter))
    }
}

impl LegacyLedger for PostgresLedgerStore {
    fn apply_initial_balance(
        &self,
        item_id: ItemId,
        quantity: i64,
        note: Option<String>,
        user_id: Option<UserId>,
    ) -> LedgerResult<i64> {
        block_on(self.apply_initial_balance_for(item_id, quantity, note, user_id))
    }

    fn record_movement(&self, movement: StockMovement) -> LedgerResult<()> {
        block_on(self.insert_movement(&movement))
    }

    fn movements_for(&self, item_id: ItemId) -> LedgerResult<Vec<StockMovement>> {
        block_on(self.item_movements(item_id))
    }

    fn record_adjustment(&self, adjustment: StockAdjustment) -> LedgerResult<()> {
        block_on(self.insert_adjustment(&adjustment))
    }

    fn adjustments_for(&self, target: &AdjustmentTarget) -> LedgerResult<Vec<StockAdjustment>> {
        block_on(self.target_adjustments(target))
    }
}

impl MasterData for PostgresLedgerStore {
    fn resolve_item(&self, code: &str, attrs: &NewItem) -> LedgerResult<Item> {
        block_on(self.resolve_item_by_code(code, attrs))
    }

    fn lookup_item(&self, code: &str) -> LedgerResult<Option<Item>> {
        block_on(self.lookup_item_by_code(code))
    }

    fn resolve_warehouse(&self, code: &str, name: Option<&str>) -> LedgerResult<Warehouse> {
        block_on(self.resolve_warehouse_by_code(code, name))
    }

    fn lookup_warehouse(&self, code: &str) -> LedgerResult<Option<Warehouse>> {
        block_on(self.lookup_warehouse_by_code(code))
    }
}
