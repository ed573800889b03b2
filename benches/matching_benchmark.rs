// ============================================================================
// Trades Engine Benchmarks
// ============================================================================
//
// Benchmark Categories:
// 1. Matching - Order placement through a single matching engine
// 2. Book Queries - Snapshot, depth and BBO computation
// 3. Pipeline - Sequenced submission through the full pipeline
// 4. Journal - Record encoding
// ============================================================================

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use trades_engine::journal::JournalRecord;
use trades_engine::prelude::*;

const PAIR: &str = "BTCUSD";

fn order(id: String, side: Side, price: i64, volume: i64) -> Order {
    PlaceOrder::limit(
        id,
        "bench",
        PAIR,
        side,
        Price::from_integer(price).unwrap(),
        Volume::from_integer(volume).unwrap(),
    )
    .into_order()
}

/// Engine with `levels` one-lot asks starting at 50000, one per price
fn engine_with_asks(levels: i64) -> MatchingEngine {
    let mut engine = MatchingEngine::new(PAIR.into(), Box::new(PriceTimePriority::new()), 10);
    for i in 0..levels {
        engine
            .place_order(order(format!("ask{i}"), Side::Sell, 50000 + i, 1))
            .unwrap();
    }
    engine
}

fn next_id(counter: &AtomicU64) -> String {
    format!("bench{}", counter.fetch_add(1, Ordering::Relaxed))
}

// ============================================================================
// Matching Benchmarks
// ============================================================================

fn benchmark_price_time_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_time_matching");

    for levels in [100i64, 1000, 10000] {
        group.bench_with_input(BenchmarkId::from_parameter(levels), &levels, |b, &levels| {
            let counter = AtomicU64::new(0);
            b.iter_batched(
                || engine_with_asks(levels),
                |mut engine| {
                    // Sweeps the first five levels
                    let buy = order(next_id(&counter), Side::Buy, 50004, 5);
                    black_box(engine.place_order(buy).unwrap())
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn benchmark_order_submission_no_match(c: &mut Criterion) {
    c.bench_function("order_submission_no_match", |b| {
        let mut engine = engine_with_asks(1000);
        let counter = AtomicU64::new(0);

        b.iter(|| {
            // Bids below every ask rest without matching
            let buy = order(next_id(&counter), Side::Buy, 49000, 1);
            black_box(engine.place_order(buy).unwrap())
        });
    });
}

fn benchmark_cancel(c: &mut Criterion) {
    c.bench_function("cancel_resting_order", |b| {
        b.iter_batched(
            || engine_with_asks(1000),
            |mut engine| {
                black_box(
                    engine
                        .cancel_order(&"ask500".into(), &"bench".into())
                        .unwrap(),
                )
            },
            BatchSize::LargeInput,
        );
    });
}

// ============================================================================
// Book Query Benchmarks
// ============================================================================

fn benchmark_book_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_queries");

    let mut engine = engine_with_asks(100);
    for i in 0..100 {
        engine
            .place_order(order(format!("bid{i}"), Side::Buy, 49900 - i, 1))
            .unwrap();
    }
    let book = engine.book();

    group.bench_function("snapshot", |b| b.iter(|| black_box(book.snapshot())));
    group.bench_function("depth_10", |b| b.iter(|| black_box(book.depth(10))));
    group.bench_function("bbo", |b| b.iter(|| black_box(book.bbo())));

    group.finish();
}

// ============================================================================
// Pipeline Benchmarks
// ============================================================================

fn benchmark_pipeline_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for orders in [1000u64, 10000] {
        group.bench_with_input(BenchmarkId::new("submit_and_drain", orders), &orders, |b, &orders| {
            b.iter_batched(
                || {
                    let images: Vec<Box<dyn EventSubscriber>> = vec![
                        Box::new(BboMemoryImage::new()),
                        Box::new(DepthMemoryImage::new(10)),
                    ];
                    TradingPipeline::start(&ExchangeConfig::coin_exchange(), images).unwrap()
                },
                |pipeline| {
                    let handle = pipeline.handle();
                    let tickets: Vec<_> = (0..orders)
                        .map(|i| {
                            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                            let price = 50000 + (i % 7) as i64 - 3;
                            let place = PlaceOrder::limit(
                                format!("o{i}"),
                                "bench",
                                PAIR,
                                side,
                                Price::from_integer(price).unwrap(),
                                Volume::from_integer(1).unwrap(),
                            );
                            handle.submit(place).unwrap()
                        })
                        .collect();
                    for ticket in tickets {
                        black_box(ticket.wait().unwrap());
                    }
                    pipeline.wait_until_drained(Duration::from_secs(60));
                    pipeline.shutdown().unwrap()
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

// ============================================================================
// Journal Benchmarks
// ============================================================================

fn benchmark_journal_encoding(c: &mut Criterion) {
    let mut engine = engine_with_asks(50);
    let execution = engine
        .place_order(order("taker".to_string(), Side::Buy, 50002, 3))
        .unwrap();
    let record = JournalRecord::new(1, OutputEvent::Trade(execution.outcome.trades[0].clone()));
    let line = record.encode().unwrap();

    c.bench_function("journal_encode_trade", |b| b.iter(|| black_box(record.encode().unwrap())));
    c.bench_function("journal_decode_trade", |b| {
        b.iter(|| black_box(JournalRecord::decode(line.trim_end(), 1).unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_price_time_matching,
    benchmark_order_submission_no_match,
    benchmark_cancel,
    benchmark_book_queries,
    benchmark_pipeline_throughput,
    benchmark_journal_encoding,
);
criterion_main!(benches);
