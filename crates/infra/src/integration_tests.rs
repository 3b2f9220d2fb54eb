//! End-to-end tests across the service, store, and legacy bridge.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use kardex_core::LedgerError;
    use kardex_ledger::{
        AdjustStock, DecrementStock, Direction, EntryFilter, IncrementStock, LedgerCommand,
        MovementMeta, TransactionType,
    };

    use crate::import::{CommandRow, InitialBalanceRow, import_initial_balances, run_batch};
    use crate::ledger_store::{InMemoryLedgerStore, StockIssue, StockLedger};
    use crate::legacy_bridge::LegacyLedgerBridge;
    use crate::master_data::MasterData;
    use crate::service::{CommandOutcome, LedgerService};

    type Store = Arc<InMemoryLedgerStore>;
    type Service = LedgerService<Store, Store>;

    fn setup() -> (Service, Store) {
        let store = Arc::new(InMemoryLedgerStore::new());
        (LedgerService::new(store.clone(), store.clone()), store)
    }

    fn receive(item: &str, warehouse: &str, quantity: i64) -> LedgerCommand {
        LedgerCommand::Increment(IncrementStock {
            warehouse_code: warehouse.to_string(),
            item_code: item.to_string(),
            item_name: None,
            category: None,
            unit: None,
            quantity,
            tx_type: TransactionType::Purchase,
            document: None,
            division: None,
            note: None,
            user_id: None,
        })
    }

    fn issue(item: &str, quantity: i64) -> LedgerCommand {
        LedgerCommand::Decrement(DecrementStock {
            item_code: item.to_string(),
            quantity,
            tx_type: TransactionType::Sale,
            document: None,
            note: None,
            user_id: None,
        })
    }

    #[test]
    fn issue_skips_empty_warehouses_and_reports_true_availability() {
        let (service, store) = setup();
        // Warehouse A exists but holds nothing; B holds 50.
        service.execute(receive("BRK-01", "A", 0)).unwrap();
        service.execute(receive("BRK-01", "B", 50)).unwrap();

        let outcome = service.execute(issue("BRK-01", 30)).unwrap();
        let item_id = match outcome {
            CommandOutcome::Decremented { item_id, deductions } => {
                assert_eq!(deductions.len(), 1);
                assert_eq!(deductions[0].taken, 30);
                item_id
            }
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(store.total_for(item_id).unwrap(), 20);

        let err = service.execute(issue("BRK-01", 21)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                available: 20,
                requested: 21
            }
        );
        // The failed issue left everything untouched.
        assert_eq!(store.total_for(item_id).unwrap(), 20);
        assert_eq!(store.aggregate_for(item_id).unwrap(), 20);
    }

    #[test]
    fn issue_drains_lots_in_receipt_order() {
        let (service, store) = setup();
        service.execute(receive("BRK-01", "OLD", 10)).unwrap();
        service.execute(receive("BRK-01", "MID", 10)).unwrap();
        service.execute(receive("BRK-01", "NEW", 10)).unwrap();
        let item = service.master().lookup_item("BRK-01").unwrap().unwrap();

        match service.execute(issue("BRK-01", 25)).unwrap() {
            CommandOutcome::Decremented { deductions, .. } => {
                assert_eq!(
                    deductions.iter().map(|d| d.taken).collect::<Vec<_>>(),
                    vec![10, 10, 5]
                );
                assert_eq!(deductions[0].remaining, 0);
                assert_eq!(deductions[2].remaining, 5);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let lots = store.lots_for(item.id).unwrap();
        assert_eq!(
            lots.iter().map(|l| l.quantity).collect::<Vec<_>>(),
            vec![0, 0, 5]
        );
    }

    #[test]
    fn audit_log_records_every_partial_deduction() {
        let (service, store) = setup();
        service.execute(receive("BRK-01", "A", 10)).unwrap();
        service.execute(receive("BRK-01", "B", 10)).unwrap();
        service.execute(issue("BRK-01", 15)).unwrap();
        let item = service.master().lookup_item("BRK-01").unwrap().unwrap();

        let entries = store.entries(&EntryFilter::for_item(item.id)).unwrap();
        let outs: Vec<_> = entries
            .iter()
            .filter(|e| e.direction == Direction::Out)
            .collect();
        assert_eq!(outs.len(), 2);
        assert_eq!(outs.iter().map(|e| e.quantity).sum::<i64>(), -15);
        assert!(outs.iter().all(|e| e.warehouse_id.is_some()));

        let signed_total: i64 = entries.iter().map(|e| e.quantity).sum();
        assert_eq!(signed_total, store.total_for(item.id).unwrap());
    }

    #[test]
    fn concurrent_issues_never_oversell() {
        let (service, store) = setup();
        service.execute(receive("BRK-01", "MAIN", 100)).unwrap();
        let item = service.master().lookup_item("BRK-01").unwrap().unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let item_id = item.id;
            handles.push(thread::spawn(move || {
                let mut taken = 0;
                for _ in 0..5 {
                    let issue = StockIssue {
                        item_id,
                        warehouse_id: None,
                        quantity: 7,
                        meta: MovementMeta::now(TransactionType::Sale),
                    };
                    if store.decrement_fifo(issue).is_ok() {
                        taken += 7;
                    }
                }
                taken
            }));
        }

        let total_taken: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let remaining = store.total_for(item.id).unwrap();
        // 8 threads * 5 attempts * 7 units = 280 demanded against 100.
        assert!(total_taken <= 100);
        assert_eq!(remaining, 100 - total_taken);
        assert!(remaining >= 0);
        assert_eq!(store.aggregate_for(item.id).unwrap(), remaining);
    }

    #[test]
    fn stocktake_after_receipts_settles_on_counted_quantity() {
        let (service, store) = setup();
        service.execute(receive("BRK-01", "MAIN", 80)).unwrap();
        service.execute(issue("BRK-01", 30)).unwrap();

        // The physical count found 45, not 50.
        let outcome = service
            .execute(LedgerCommand::Adjust(AdjustStock {
                item_code: "BRK-01".to_string(),
                new_quantity: 45,
                warehouse_code: Some("MAIN".to_string()),
                note: Some("annual stocktake".to_string()),
                user_id: None,
            }))
            .unwrap();
        let item = service.master().lookup_item("BRK-01").unwrap().unwrap();
        assert!(matches!(outcome, CommandOutcome::Adjusted { delta: -5, .. }));
        assert_eq!(store.total_for(item.id).unwrap(), 45);
        assert_eq!(store.aggregate_for(item.id).unwrap(), 45);
    }

    #[test]
    fn aggregate_drift_is_repaired_by_reconcile() {
        let (service, store) = setup();
        service.execute(receive("BRK-01", "MAIN", 30)).unwrap();
        let item = service.master().lookup_item("BRK-01").unwrap().unwrap();

        // Warehouse-agnostic path moves the aggregate away from the lots.
        service
            .execute(LedgerCommand::Adjust(AdjustStock {
                item_code: "BRK-01".to_string(),
                new_quantity: 42,
                warehouse_code: None,
                note: None,
                user_id: None,
            }))
            .unwrap();
        assert_eq!(store.aggregate_for(item.id).unwrap(), 42);
        assert_eq!(store.total_for(item.id).unwrap(), 30);

        assert_eq!(store.reconcile(item.id).unwrap(), 30);
        assert_eq!(store.aggregate_for(item.id).unwrap(), 30);
    }

    #[test]
    fn mixed_batch_then_reimport_yields_no_net_change() {
        let (service, store) = setup();
        let bridge = LegacyLedgerBridge::new(store.clone());

        let balances = || {
            vec![
                InitialBalanceRow {
                    line: 1,
                    item_code: "BRK-01".to_string(),
                    item_name: Some("Bracket".to_string()),
                    category: Some("hardware".to_string()),
                    unit: Some("pcs".to_string()),
                    warehouse_code: Some("MAIN".to_string()),
                    quantity: 60,
                    note: None,
                },
                InitialBalanceRow {
                    line: 2,
                    item_code: "PLT-07".to_string(),
                    item_name: None,
                    category: None,
                    unit: None,
                    warehouse_code: None,
                    quantity: 25,
                    note: Some("opening".to_string()),
                },
            ]
        };

        assert!(import_initial_balances(&service, &bridge, balances()).is_clean());
        let batch = vec![CommandRow {
            line: 1,
            command: issue("BRK-01", 10),
        }];
        let summary = run_batch(&service, batch);
        assert_eq!(summary.processed, 1);

        let brk = service.master().lookup_item("BRK-01").unwrap().unwrap();
        let plt = service.master().lookup_item("PLT-07").unwrap().unwrap();
        assert_eq!(store.total_for(brk.id).unwrap(), 50);
        assert_eq!(store.aggregate_for(plt.id).unwrap(), 25);

        // Re-running the balance sheet sets balances back to the sheet's
        // values; it does not double them.
        assert!(import_initial_balances(&service, &bridge, balances()).is_clean());
        assert_eq!(store.total_for(brk.id).unwrap(), 60);
        assert_eq!(store.aggregate_for(plt.id).unwrap(), 25);
        assert_eq!(bridge.movements_for(plt.id).unwrap().len(), 1);
    }
}
