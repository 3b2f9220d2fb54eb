//! Command execution over the stock ledger.
//!
//! `LedgerService` is the write-side entry point: it validates a command,
//! resolves human-entered codes to master-data records, and routes the
//! movement to the right ledger operation. It mirrors how documents flow in
//! from the outer layers (order postings, import sheets, manual corrections)
//! without knowing anything about those layers.

use tracing::{info, instrument};

use kardex_core::{ItemId, LedgerError, LedgerResult, WarehouseId};
use kardex_ledger::{
    AdjustStock, DecrementStock, IncrementStock, LedgerCommand, LotDeduction, MovementMeta,
    NewItem, TransactionType,
};

use crate::ledger_store::{StockIssue, StockLedger, StockReceipt};
use crate::master_data::MasterData;

/// What a successfully executed command did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Stock was received into one lot; carries the lot quantity afterwards.
    Incremented {
        item_id: ItemId,
        warehouse_id: WarehouseId,
        lot_quantity: i64,
    },
    /// An opening balance was set; `delta` is the aggregate movement.
    InitialSet {
        item_id: ItemId,
        warehouse_id: WarehouseId,
        delta: i64,
    },
    /// Stock was issued FIFO; one deduction per depleted lot.
    Decremented {
        item_id: ItemId,
        deductions: Vec<LotDeduction>,
    },
    /// The warehouse-agnostic aggregate moved by `delta`.
    Adjusted { item_id: ItemId, delta: i64 },
    /// The command was valid but changed nothing.
    Noop { item_id: ItemId },
}

/// Write-side service binding a ledger store to master-data resolution.
#[derive(Debug, Clone)]
pub struct LedgerService<S, M> {
    store: S,
    master: M,
}

impl<S, M> LedgerService<S, M>
where
    S: StockLedger,
    M: MasterData,
{
    pub fn new(store: S, master: M) -> Self {
        Self { store, master }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn master(&self) -> &M {
        &self.master
    }

    /// Validate and execute one command.
    ///
    /// Increments create unknown items and warehouses on first use (import
    /// sheets reference items that do not exist yet). Decrements and
    /// adjustments require an existing item and fail with `RecordNotFound`
    /// otherwise.
    #[instrument(skip(self, command), fields(item_code = %command.item_code()), err)]
    pub fn execute(&self, command: LedgerCommand) -> LedgerResult<CommandOutcome> {
        command.validate()?;
        match command {
            LedgerCommand::Increment(cmd) => self.execute_increment(cmd),
            LedgerCommand::Decrement(cmd) => self.execute_decrement(cmd),
            LedgerCommand::Adjust(cmd) => self.execute_adjust(cmd),
        }
    }

    fn execute_increment(&self, cmd: IncrementStock) -> LedgerResult<CommandOutcome> {
        let warehouse = self.master.resolve_warehouse(&cmd.warehouse_code, None)?;
        let attrs = NewItem {
            name: cmd.item_name.clone(),
            category: cmd.category.clone(),
            unit: cmd.unit.clone(),
        };
        let item = self.master.resolve_item(&cmd.item_code, &attrs)?;

        let meta = MovementMeta {
            tx_type: cmd.tx_type,
            document: cmd.document,
            division: cmd.division,
            note: cmd.note,
            user_id: cmd.user_id,
            occurred_at: chrono::Utc::now(),
        };

        // Opening balances replace instead of accumulate, so repeated import
        // runs converge on the sheet's value.
        if cmd.tx_type == TransactionType::InitialStock {
            let delta = self
                .store
                .set_initial_stock(item.id, warehouse.id, cmd.quantity, meta)?;
            info!(item_id = %item.id, warehouse_id = %warehouse.id, delta, "initial stock set");
            return Ok(CommandOutcome::InitialSet {
                item_id: item.id,
                warehouse_id: warehouse.id,
                delta,
            });
        }

        let lot_quantity = self.store.increment(StockReceipt {
            item_id: item.id,
            warehouse_id: warehouse.id,
            quantity: cmd.quantity,
            meta,
        })?;
        info!(item_id = %item.id, warehouse_id = %warehouse.id, quantity = cmd.quantity, "stock received");
        Ok(CommandOutcome::Incremented {
            item_id: item.id,
            warehouse_id: warehouse.id,
            lot_quantity,
        })
    }

    fn execute_decrement(&self, cmd: DecrementStock) -> LedgerResult<CommandOutcome> {
        let item = self.require_item(&cmd.item_code)?;
        let meta = MovementMeta {
            tx_type: cmd.tx_type,
            document: cmd.document,
            division: None,
            note: cmd.note,
            user_id: cmd.user_id,
            occurred_at: chrono::Utc::now(),
        };

        let deductions = self.store.decrement_fifo(StockIssue {
            item_id: item.id,
            warehouse_id: None,
            quantity: cmd.quantity,
            meta,
        })?;
        info!(item_id = %item.id, quantity = cmd.quantity, lots = deductions.len(), "stock issued");
        Ok(CommandOutcome::Decremented {
            item_id: item.id,
            deductions,
        })
    }

    /// Stocktake correction to an absolute quantity.
    ///
    /// With a warehouse code the delta is applied against that warehouse's
    /// lot (receipt for a surplus, scoped FIFO issue for a shortfall). With
    /// no warehouse the delta goes through the warehouse-agnostic aggregate
    /// path.
    fn execute_adjust(&self, cmd: AdjustStock) -> LedgerResult<CommandOutcome> {
        let item = self.require_item(&cmd.item_code)?;
        let mut meta = MovementMeta::now(TransactionType::Adjustment);
        meta.note = cmd.note;
        meta.user_id = cmd.user_id;

        match cmd.warehouse_code {
            Some(warehouse_code) => {
                let warehouse = self
                    .master
                    .lookup_warehouse(&warehouse_code)?
                    .ok_or_else(|| {
                        LedgerError::not_found(format!("warehouse '{warehouse_code}'"))
                    })?;

                let current = self
                    .store
                    .lots_for(item.id)?
                    .into_iter()
                    .filter(|lot| lot.warehouse_id == warehouse.id)
                    .map(|lot| lot.quantity)
                    .sum::<i64>();
                let delta = cmd.new_quantity - current;

                if delta == 0 {
                    return Ok(CommandOutcome::Noop { item_id: item.id });
                }
                if delta > 0 {
                    self.store.increment(StockReceipt {
                        item_id: item.id,
                        warehouse_id: warehouse.id,
                        quantity: delta,
                        meta,
                    })?;
                } else {
                    self.store.decrement_fifo(StockIssue {
                        item_id: item.id,
                        warehouse_id: Some(warehouse.id),
                        quantity: -delta,
                        meta,
                    })?;
                }
                info!(item_id = %item.id, warehouse_id = %warehouse.id, delta, "stock adjusted");
                Ok(CommandOutcome::Adjusted {
                    item_id: item.id,
                    delta,
                })
            }
            None => {
                let current = self.store.aggregate_for(item.id)?;
                let delta = cmd.new_quantity - current;
                if delta == 0 {
                    return Ok(CommandOutcome::Noop { item_id: item.id });
                }
                self.store.adjust_aggregate(item.id, delta, meta)?;
                info!(item_id = %item.id, delta, "aggregate adjusted");
                Ok(CommandOutcome::Adjusted {
                    item_id: item.id,
                    delta,
                })
            }
        }
    }

    fn require_item(&self, code: &str) -> LedgerResult<kardex_ledger::Item> {
        self.master
            .lookup_item(code)?
            .ok_or_else(|| LedgerError::not_found(format!("item '{code}'")))
    }
}
