//! Channel and semaphore throughput benchmark.
//!
//! Measures send→recv latency over in-memory and framed channels, and the
//! uncontended semaphore fast path, using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use isolate_ipc::channel::{FramedTransport, MemoryTransport, Transport};
use isolate_ipc::sync::Semaphore;

fn bench_memory_channel(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (tx, rx) = MemoryTransport::new().channel("bench").unwrap();

    let mut group = c.benchmark_group("memory_channel");
    for &size in &[0usize, 64, 1024, 65536] {
        let payload = vec![0xABu8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, p| {
            b.iter(|| {
                rt.block_on(async {
                    tx.send(black_box(p.clone())).await.unwrap();
                    rx.recv().await.unwrap()
                })
            });
        });
    }
    group.finish();
}

fn bench_framed_channel(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (tx, rx) = rt.block_on(async { FramedTransport::new(1024 * 1024).channel("bench").unwrap() });

    let mut group = c.benchmark_group("framed_channel");
    for &size in &[0usize, 64, 1024, 16384] {
        let payload = vec![0xABu8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, p| {
            b.iter(|| {
                rt.block_on(async {
                    tx.send(black_box(p.clone())).await.unwrap();
                    rx.recv().await.unwrap()
                })
            });
        });
    }
    group.finish();
}

fn bench_semaphore(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let semaphore = Semaphore::with_permits(1);

    c.bench_function("semaphore_acquire_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                semaphore.acquire().await;
                semaphore.release();
            })
        });
    });
}

criterion_group!(benches, bench_memory_channel, bench_framed_channel, bench_semaphore);
criterion_main!(benches);
