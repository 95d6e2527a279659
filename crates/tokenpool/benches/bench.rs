use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::{Duration, Instant},
};
use tempfile::TempDir;
use tokenpool::{
    Allocator, BackingStore, Region, RegionHandle, StoreKind, SupplierError, SupplyReport,
    SupplyRequest,
};

// Number of tokens allocated per benchmark iteration.
const TOTAL_TOKENS: u64 = 4096;

/// Writes `SN<n>` tokens; cheaper than UUIDs so the store dominates.
fn serial_supplier(
    _: &Region,
    store: &dyn BackingStore,
    request: &SupplyRequest,
) -> Result<SupplyReport, SupplierError> {
    let tokens: Vec<String> = (0..request.requested_size)
        .map(|i| format!("SN{:012}{i:08}", request.random_number))
        .collect();
    store.append(&tokens)?;
    Ok(SupplyReport::success(request.requested_size))
}

fn fresh_handle(kind: StoreKind, batch: u64) -> (TempDir, RegionHandle) {
    let dir = TempDir::new().unwrap();
    let region = Region::new("bench", kind, dir.path(), batch);
    let handle = RegionHandle::open(region).unwrap();
    handle.store().ensure_exists().unwrap();
    (dir, handle)
}

/// Benchmarks sequential allocation in fixed-size chunks from a pre-filled
/// region (no replenishment inside the timed section).
fn bench_sequential(c: &mut Criterion, group_name: &str, kind: StoreKind) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_TOKENS));

    for chunk in [1, 16, 256] {
        group.bench_function(format!("elems/{TOTAL_TOKENS}/chunk/{chunk}"), |b| {
            b.iter_custom(|iters| {
                let mut elapsed = Duration::ZERO;
                for _ in 0..iters {
                    let (_dir, handle) = fresh_handle(kind, TOTAL_TOKENS);
                    let allocator = Allocator::new(serial_supplier);
                    black_box(allocator.allocate(&handle, 1).unwrap());

                    let start = Instant::now();
                    for _ in 0..(TOTAL_TOKENS - 1) / chunk {
                        black_box(allocator.allocate(&handle, chunk).unwrap());
                    }
                    elapsed += start.elapsed();
                }
                elapsed
            });
        });
    }

    group.finish();
}

/// Benchmarks one region shared by several threads.
fn bench_contended(c: &mut Criterion, group_name: &str, kind: StoreKind) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_TOKENS));

    for thread_count in [1, 2, 4, 8] {
        let per_thread = TOTAL_TOKENS / 16 / thread_count;

        group.bench_function(
            format!("elems/{TOTAL_TOKENS}/threads/{thread_count}"),
            |b| {
                b.iter_custom(|iters| {
                    let mut elapsed = Duration::ZERO;
                    for _ in 0..iters {
                        let (_dir, handle) = fresh_handle(kind, TOTAL_TOKENS * 2);
                        let allocator = Allocator::new(serial_supplier);
                        allocator.allocate(&handle, 1).unwrap();
                        let barrier = Arc::new(Barrier::new(thread_count as usize + 1));

                        let start = scope(|s| {
                            for _ in 0..thread_count {
                                let barrier = Arc::clone(&barrier);
                                let (allocator, handle) = (&allocator, &handle);
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..per_thread {
                                        black_box(allocator.allocate(handle, 16).unwrap());
                                    }
                                });
                            }
                            barrier.wait();
                            Instant::now()
                        });
                        elapsed += start.elapsed();
                    }
                    elapsed
                });
            },
        );
    }

    group.finish();
}

fn benchmark_line_file_sequential(c: &mut Criterion) {
    bench_sequential(c, "line_file/sequential", StoreKind::LineFile);
}

fn benchmark_line_file_contended(c: &mut Criterion) {
    bench_contended(c, "line_file/contended", StoreKind::LineFile);
}

fn benchmark_row_sequential(c: &mut Criterion) {
    bench_sequential(c, "row/sequential", StoreKind::Row);
}

fn benchmark_row_contended(c: &mut Criterion) {
    bench_contended(c, "row/contended", StoreKind::Row);
}

criterion_group!(
    benches,
    benchmark_line_file_sequential,
    benchmark_line_file_contended,
    // Every take fsyncs; expect these to be disk bound.
    benchmark_row_sequential,
    benchmark_row_contended,
);
criterion_main!(benches);
