use criterion::{Criterion, criterion_group, criterion_main};
use domain::{ReservationLine, ReservationRequest, StockItem};

fn bench_reserve_release(c: &mut Criterion) {
    let mut item = StockItem::new("SKU-BENCH", 1_000_000).unwrap();

    c.bench_function("ledger/reserve_release", |b| {
        b.iter(|| {
            item.reserve(3).unwrap();
            item.release(3).unwrap();
        });
    });
}

fn bench_quantities_by_product(c: &mut Criterion) {
    let lines: Vec<ReservationLine> = (0..50)
        .map(|i| ReservationLine::new(format!("SKU-{:03}", i % 20), 1))
        .collect();
    let request = ReservationRequest::new(
        common::CorrelationId::new(),
        common::AggregateId::new(),
        lines,
    );

    c.bench_function("ledger/quantities_by_product_50_lines", |b| {
        b.iter(|| request.quantities_by_product());
    });
}

criterion_group!(benches, bench_reserve_release, bench_quantities_by_product);
criterion_main!(benches);
