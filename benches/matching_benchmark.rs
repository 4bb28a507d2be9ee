use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use matchbook::orderbook::{Order, OrderBook, OrderId, Side};

/// Build a one-sided book with `levels` ask levels of one order each.
fn populated_book(levels: usize) -> OrderBook {
    let book = OrderBook::new();
    for i in 0..levels {
        let price = 100.0 + i as f64 * 0.01;
        book.add_order(Order::limit(format!("s{}", i), Side::Sell, price, 10.0))
            .unwrap();
    }
    book
}

fn market_sweep_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");

    group.bench_function("market order sweeping 10 of 1000 levels", |b| {
        b.iter_batched(
            || populated_book(1000),
            |book| {
                let mut taker = Order::market("taker", Side::Buy, 100.0);
                black_box(book.match_order(&mut taker));
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("marketable limit against top of book", |b| {
        b.iter_batched(
            || populated_book(1000),
            |book| {
                let mut taker = Order::limit("taker", Side::Buy, 100.0, 10.0);
                black_box(book.match_order(&mut taker));
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn add_cancel_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("book maintenance");

    let book = populated_book(1000);
    group.bench_function("add and cancel far from the touch", |b| {
        b.iter(|| {
            book.add_order(Order::limit("probe", Side::Buy, 50.0, 1.0))
                .unwrap();
            book.cancel_order(&OrderId::new("probe")).unwrap();
        });
    });

    let book = populated_book(1000);
    group.bench_function("best ask read", |b| {
        b.iter(|| black_box(book.best_ask()));
    });

    group.finish();
}

criterion_group!(benches, market_sweep_benchmark, add_cancel_benchmark);
criterion_main!(benches);
