//! Bulk command import with row-level failure isolation.
//!
//! Import sheets arrive with hundreds of rows of mixed quality. A bad row
//! must not sink the batch: each row runs as its own transaction, failures
//! are collected with their line numbers, and the rest of the sheet goes
//! through. Re-running a sheet is safe because opening balances converge
//! instead of accumulating.

use tracing::{info, warn};

use kardex_core::LedgerResult;
use kardex_ledger::{IncrementStock, LedgerCommand, TransactionType};

use crate::ledger_store::{LegacyLedger, StockLedger};
use crate::legacy_bridge::LegacyLedgerBridge;
use crate::master_data::MasterData;
use crate::service::LedgerService;

/// One command with its source line, for failure reporting.
#[derive(Debug, Clone)]
pub struct CommandRow {
    pub line: usize,
    pub command: LedgerCommand,
}

/// A row that did not go through, with the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub line: usize,
    pub item_code: String,
    pub reason: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<RowFailure>,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Execute a batch of commands, isolating failures per row.
pub fn run_batch<S, M>(service: &LedgerService<S, M>, rows: Vec<CommandRow>) -> BatchSummary
where
    S: StockLedger,
    M: MasterData,
{
    let mut summary = BatchSummary::default();
    for row in rows {
        let item_code = row.command.item_code().to_string();
        match service.execute(row.command) {
            Ok(_) => summary.processed += 1,
            Err(err) => {
                warn!(line = row.line, item_code = %item_code, error = %err, "import row failed");
                summary.skipped += 1;
                summary.failures.push(RowFailure {
                    line: row.line,
                    item_code,
                    reason: err.to_string(),
                });
            }
        }
    }
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        "batch finished"
    );
    summary
}

/// One opening-balance row from an import sheet.
#[derive(Debug, Clone)]
pub struct InitialBalanceRow {
    pub line: usize,
    pub item_code: String,
    pub item_name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    /// Warehouse column; blank rows fall back to the legacy per-item path.
    pub warehouse_code: Option<String>,
    pub quantity: i64,
    pub note: Option<String>,
}

/// Import opening balances, one row per transaction.
///
/// Rows with a warehouse go through the warehouse-aware ledger as
/// `InitialStock` movements; rows without one feed the legacy per-item
/// ledger. Both paths converge on re-import, so the whole sheet can be run
/// again after fixing failed rows without doubling stock.
pub fn import_initial_balances<S, M>(
    service: &LedgerService<S, M>,
    bridge: &LegacyLedgerBridge<S>,
    rows: Vec<InitialBalanceRow>,
) -> BatchSummary
where
    S: StockLedger + LegacyLedger,
    M: MasterData,
{
    let mut summary = BatchSummary::default();
    for row in rows {
        let result = import_balance_row(service, bridge, &row);
        match result {
            Ok(()) => summary.processed += 1,
            Err(err) => {
                warn!(line = row.line, item_code = %row.item_code, error = %err, "balance row failed");
                summary.skipped += 1;
                summary.failures.push(RowFailure {
                    line: row.line,
                    item_code: row.item_code,
                    reason: err.to_string(),
                });
            }
        }
    }
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        "initial balance import finished"
    );
    summary
}

fn import_balance_row<S, M>(
    service: &LedgerService<S, M>,
    bridge: &LegacyLedgerBridge<S>,
    row: &InitialBalanceRow,
) -> LedgerResult<()>
where
    S: StockLedger + LegacyLedger,
    M: MasterData,
{
    match &row.warehouse_code {
        Some(warehouse_code) => {
            let command = LedgerCommand::Increment(IncrementStock {
                warehouse_code: warehouse_code.clone(),
                item_code: row.item_code.clone(),
                item_name: row.item_name.clone(),
                category: row.category.clone(),
                unit: row.unit.clone(),
                quantity: row.quantity,
                tx_type: TransactionType::InitialStock,
                document: None,
                division: None,
                note: row.note.clone(),
                user_id: None,
            });
            service.execute(command)?;
            Ok(())
        }
        None => {
            let attrs = kardex_ledger::NewItem {
                name: row.item_name.clone(),
                category: row.category.clone(),
                unit: row.unit.clone(),
            };
            let item = service.master().resolve_item(&row.item_code, &attrs)?;
            bridge.apply_initial_balance(item.id, row.quantity, row.note.clone(), None)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ledger_store::InMemoryLedgerStore;
    use kardex_ledger::DecrementStock;

    type TestService = LedgerService<Arc<InMemoryLedgerStore>, Arc<InMemoryLedgerStore>>;

    fn setup() -> (TestService, LegacyLedgerBridge<Arc<InMemoryLedgerStore>>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        (
            LedgerService::new(store.clone(), store.clone()),
            LegacyLedgerBridge::new(store),
        )
    }

    fn balance_row(line: usize, item: &str, warehouse: Option<&str>, qty: i64) -> InitialBalanceRow {
        InitialBalanceRow {
            line,
            item_code: item.to_string(),
            item_name: None,
            category: None,
            unit: None,
            warehouse_code: warehouse.map(str::to_string),
            quantity: qty,
            note: None,
        }
    }

    #[test]
    fn bad_rows_do_not_sink_the_batch() {
        let (service, _) = setup();
        let rows = vec![
            CommandRow {
                line: 1,
                command: LedgerCommand::Increment(IncrementStock {
                    warehouse_code: "MAIN".to_string(),
                    item_code: "A-1".to_string(),
                    item_name: None,
                    category: None,
                    unit: None,
                    quantity: 30,
                    tx_type: TransactionType::Purchase,
                    document: None,
                    division: None,
                    note: None,
                    user_id: None,
                }),
            },
            // Unknown item; decrements do not create.
            CommandRow {
                line: 2,
                command: LedgerCommand::Decrement(DecrementStock {
                    item_code: "MISSING".to_string(),
                    quantity: 5,
                    tx_type: TransactionType::Sale,
                    document: None,
                    note: None,
                    user_id: None,
                }),
            },
            CommandRow {
                line: 3,
                command: LedgerCommand::Decrement(DecrementStock {
                    item_code: "A-1".to_string(),
                    quantity: 10,
                    tx_type: TransactionType::Sale,
                    document: None,
                    note: None,
                    user_id: None,
                }),
            },
        ];

        let summary = run_batch(&service, rows);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failures[0].line, 2);
        assert_eq!(summary.failures[0].item_code, "MISSING");

        let item = service.master().lookup_item("A-1").unwrap().unwrap();
        assert_eq!(service.store().total_for(item.id).unwrap(), 20);
    }

    #[test]
    fn balance_import_routes_by_warehouse_presence() {
        let (service, bridge) = setup();
        let rows = vec![
            balance_row(1, "A-1", Some("MAIN"), 40),
            balance_row(2, "B-2", None, 15),
        ];

        let summary = import_initial_balances(&service, &bridge, rows);
        assert!(summary.is_clean());
        assert_eq!(summary.processed, 2);

        let a = service.master().lookup_item("A-1").unwrap().unwrap();
        let b = service.master().lookup_item("B-2").unwrap().unwrap();
        assert_eq!(service.store().total_for(a.id).unwrap(), 40);
        // Legacy path moves the aggregate but opens no lots.
        assert_eq!(service.store().aggregate_for(b.id).unwrap(), 15);
        assert_eq!(service.store().total_for(b.id).unwrap(), 0);
        assert_eq!(bridge.movements_for(b.id).unwrap().len(), 1);
    }

    #[test]
    fn reimport_is_stable() {
        let (service, bridge) = setup();
        let rows = || {
            vec![
                balance_row(1, "A-1", Some("MAIN"), 40),
                balance_row(2, "B-2", None, 15),
            ]
        };

        import_initial_balances(&service, &bridge, rows());
        import_initial_balances(&service, &bridge, rows());

        let a = service.master().lookup_item("A-1").unwrap().unwrap();
        let b = service.master().lookup_item("B-2").unwrap().unwrap();
        assert_eq!(service.store().total_for(a.id).unwrap(), 40);
        assert_eq!(service.store().aggregate_for(b.id).unwrap(), 15);
        assert_eq!(bridge.movements_for(b.id).unwrap().len(), 1);
    }

    #[test]
    fn negative_balance_rows_are_reported_with_their_line() {
        let (service, bridge) = setup();
        let rows = vec![
            balance_row(1, "A-1", Some("MAIN"), 40),
            balance_row(7, "C-3", Some("MAIN"), -5),
        ];

        let summary = import_initial_balances(&service, &bridge, rows);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failures[0].line, 7);
        assert_eq!(summary.failures[0].item_code, "C-3");
    }
}
