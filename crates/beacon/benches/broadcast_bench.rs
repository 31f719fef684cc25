//! Benchmarks for the broadcast path and the subscriber registry.
//!
//! Run with: cargo bench -p beacon

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use beacon::{Inline, Registry, Variable};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A variable whose engine and callbacks all run on the calling thread, so
/// each `next` measures the complete enqueue, tick, dispatch and retire cycle.
fn inline_variable(subscribers: usize) -> (Variable<u64>, Arc<AtomicU64>) {
    let var = Variable::builder()
        .label("bench")
        .target(Arc::new(Inline))
        .context(Arc::new(Inline))
        .value(0)
        .build();
    let sum = Arc::new(AtomicU64::new(0));
    for _ in 0..subscribers {
        let s = Arc::clone(&sum);
        // Subscriptions are intentionally leaked for the variable's lifetime.
        let _ = var.subscribe(move |v| {
            s.fetch_add(v, Ordering::Relaxed);
        });
    }
    (var, sum)
}

// ---------------------------------------------------------------------------
// 1. next() fan-out
// ---------------------------------------------------------------------------

fn bench_next_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("variable/next");

    for subscribers in [0usize, 1, 16, 256] {
        group.throughput(Throughput::Elements(subscribers.max(1) as u64));
        let (var, sum) = inline_variable(subscribers);
        group.bench_with_input(
            BenchmarkId::new("inline", subscribers),
            &subscribers,
            |b, _| {
                let mut v = 0u64;
                b.iter(|| {
                    v = v.wrapping_add(1);
                    var.next(black_box(v));
                });
                black_box(sum.load(Ordering::Relaxed));
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. subscribe + cancel churn
// ---------------------------------------------------------------------------

fn bench_subscribe_cancel(c: &mut Criterion) {
    let (var, _sum) = inline_variable(16);
    c.bench_function("variable/subscribe_cancel", |b| {
        b.iter(|| {
            let sub = var.subscribe(|v: u64| {
                black_box(v);
            });
            sub.cancel();
        })
    });
}

// ---------------------------------------------------------------------------
// 3. Registry operations
// ---------------------------------------------------------------------------

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for count in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("insert_remove", count), &count, |b, &n| {
            b.iter(|| {
                let mut registry = Registry::new();
                let keys: Vec<_> = (0..n).map(|i| registry.insert(i)).collect();
                // Remove every other entry, then refill the freed slots.
                for key in keys.iter().step_by(2) {
                    black_box(registry.remove(*key));
                }
                for i in 0..n / 2 {
                    registry.insert(i);
                }
                black_box(registry.len())
            })
        });

        let mut registry = Registry::new();
        let keys: Vec<_> = (0..count).map(|i| registry.insert(i)).collect();
        for key in keys.iter().step_by(3) {
            registry.remove(*key);
        }
        group.bench_with_input(BenchmarkId::new("iter", count), &registry, |b, r| {
            b.iter(|| black_box(r.iter().copied().sum::<u64>()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_next_fan_out,
    bench_subscribe_cancel,
    bench_registry,
);
criterion_main!(benches);
