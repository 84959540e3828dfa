//! Benchmarks for the best-price engine
//!
//! Run with: cargo bench --bench engine

use bestprice::notifier::PriceNotifier;
use bestprice::engine::NotifierError;
use bestprice::providers::StaticOracle;
use bestprice::{BestPriceEngine, PriceChange, Quote};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Swallows changes so only the engine is measured
struct NullNotifier;

impl PriceNotifier for NullNotifier {
    fn on_best_price_change(&self, _change: &PriceChange) -> Result<(), NotifierError> {
        Ok(())
    }
}

fn engine() -> BestPriceEngine {
    BestPriceEngine::new(Arc::new(StaticOracle::allow_all()), Arc::new(NullNotifier))
}

fn quotes(n: usize, providers: usize, pairs: usize) -> Vec<Quote> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..n)
        .map(|i| {
            let bid = Decimal::new(rng.gen_range(100..100_000), 2);
            Quote {
                provider: format!("P{}", rng.gen_range(0..providers)),
                base: format!("B{}", rng.gen_range(0..pairs)),
                quote: "USD".to_string(),
                bid,
                bid_amount: Decimal::ONE,
                ask: bid + Decimal::new(rng.gen_range(0..500), 2),
                ask_amount: Decimal::ONE,
                timestamp: i as i64,
            }
        })
        .collect()
}

// ============================================================================
// Fast path
// ============================================================================

fn bench_process(c: &mut Criterion) {
    let batch = quotes(10_000, 20, 50);

    c.bench_function("process_10k_quotes", |b| {
        b.iter(|| {
            let engine = engine();
            for quote in &batch {
                let _ = black_box(engine.process(quote.clone()));
            }
        })
    });
}

// ============================================================================
// Recompute
// ============================================================================

fn bench_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("recompute");

    for providers in [10, 50, 200] {
        let engine = engine();
        for quote in quotes(providers * 50, providers, 50) {
            let _ = engine.process(quote);
        }

        group.bench_with_input(BenchmarkId::from_parameter(providers), &engine, |b, engine| {
            b.iter(|| black_box(engine.recompute()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_process, bench_recompute);
criterion_main!(benches);
