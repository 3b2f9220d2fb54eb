use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use kardex_infra::{InMemoryLedgerStore, MasterData, StockIssue, StockLedger, StockReceipt};
use kardex_ledger::{MovementMeta, NewItem, TransactionType, allocate_fifo};

use chrono::{Duration, Utc};
use kardex_core::{ItemId, WarehouseId};
use kardex_ledger::Lot;

fn lots_with_stock(count: usize, quantity: i64) -> Vec<Lot> {
    let item_id = ItemId::new();
    let base = Utc::now();
    (0..count)
        .map(|i| {
            let mut lot = Lot::open(
                item_id,
                WarehouseId::new(),
                base + Duration::seconds(i as i64),
            );
            lot.quantity = quantity;
            lot
        })
        .collect()
}

/// Store seeded with one item spread across `warehouses` lots of `quantity`.
fn seeded_store(warehouses: usize, quantity: i64) -> (Arc<InMemoryLedgerStore>, ItemId) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let item = store.resolve_item("BENCH-ITEM", &NewItem::default()).unwrap();
    for i in 0..warehouses {
        let warehouse = store
            .resolve_warehouse(&format!("WH-{i:03}"), None)
            .unwrap();
        store
            .increment(StockReceipt {
                item_id: item.id,
                warehouse_id: warehouse.id,
                quantity,
                meta: MovementMeta::now(TransactionType::Purchase),
            })
            .unwrap();
    }
    (store, item.id)
}

fn bench_allocation_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_planning");
    for lot_count in [4usize, 64, 512] {
        let lots = lots_with_stock(lot_count, 100);
        // Demand spans roughly half the candidate lots.
        let requested = (lot_count as i64) * 50;
        group.throughput(Throughput::Elements(lot_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(lot_count),
            &lots,
            |b, lots| {
                b.iter(|| allocate_fifo(black_box(lots), black_box(requested)).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_decrement_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("decrement_roundtrip");
    for warehouses in [1usize, 16, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(warehouses),
            &warehouses,
            |b, &warehouses| {
                b.iter_batched(
                    || seeded_store(warehouses, 1_000),
                    |(store, item_id)| {
                        store
                            .decrement_fifo(StockIssue {
                                item_id,
                                warehouse_id: None,
                                quantity: black_box(700),
                                meta: MovementMeta::now(TransactionType::Sale),
                            })
                            .unwrap()
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_allocation_planning, bench_decrement_roundtrip);
criterion_main!(benches);
