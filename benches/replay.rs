//! Benchmarks for book maintenance and depth quoting.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use l3_depth_quoter::{BookStore, DepthEngine, Pair, Side};

fn populate_book(orders: usize) -> (BookStore, Pair) {
    let pair = Pair::new("Mango Markets", "SOL/USDC");
    let mut book = BookStore::new();
    let base_price = 100.0;

    for i in 0..orders {
        let is_bid = i % 2 == 0;
        let price_offset = ((i % 50) as f64) * 0.01;
        let price = if is_bid {
            base_price - price_offset
        } else {
            base_price + 0.01 + price_offset
        };
        let side = if is_bid { Side::Bid } else { Side::Ask };
        book.upsert(&pair, side, &format!("o{i}"), price, ((i % 100) + 1) as f64, None);
    }

    (book, pair)
}

fn bench_book_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("book");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("upsert_10k", |b| {
        b.iter(|| {
            let (book, _) = populate_book(10_000);
            black_box(book.pair_count())
        })
    });

    group.finish();
}

fn bench_quote_pair(c: &mut Criterion) {
    let (book, pair) = populate_book(10_000);
    let engine = DepthEngine::new();
    let ts = chrono::Utc::now();

    let mut group = c.benchmark_group("depth");
    group.bench_function("quote_pair_5_targets", |b| {
        b.iter(|| black_box(engine.quote_pair(&book, &pair, ts)))
    });
    group.finish();
}

criterion_group!(benches, bench_book_updates, bench_quote_pair);
criterion_main!(benches);
