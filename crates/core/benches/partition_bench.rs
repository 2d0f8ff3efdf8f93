//! Criterion benchmarks for rank partitioning.
//!
//! Partition construction runs once per group setup, but `locate` sits on the
//! accessor path for every rank, so both are measured across realistic world
//! sizes (one NPU node up to a large multi-node deployment).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use vllm_ascend_core::distributed::{calculate_effective_local_size, GroupPartition};

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

fn bench_contiguous(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_contiguous");

    for &(world_size, group_size) in &[(16, 8), (256, 16), (4096, 16)] {
        group.bench_with_input(
            BenchmarkId::new("world", world_size),
            &(world_size, group_size),
            |b, &(world_size, group_size)| {
                b.iter(|| {
                    GroupPartition::contiguous(black_box(world_size), black_box(group_size))
                        .expect("contiguous partition failed")
                });
            },
        );
    }
    group.finish();
}

fn bench_from_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_from_groups");

    for &world_size in &[256usize, 4096] {
        let groups: Vec<Vec<usize>> = (0..world_size / 16)
            .map(|g| (g * 16..(g + 1) * 16).collect())
            .collect();
        group.bench_with_input(
            BenchmarkId::new("world", world_size),
            &groups,
            |b, groups| {
                b.iter(|| {
                    GroupPartition::from_groups(black_box(groups.clone()))
                        .expect("from_groups rejected a valid partition")
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_locate");

    for &world_size in &[16usize, 256, 4096] {
        let partition = GroupPartition::contiguous(world_size, 16).expect("partition failed");
        // Worst case: the rank in the last group.
        let rank = world_size - 1;
        group.bench_with_input(
            BenchmarkId::new("world", world_size),
            &partition,
            |b, partition| {
                b.iter(|| partition.locate(black_box(rank)));
            },
        );
    }
    group.finish();
}

fn bench_effective_local_size(c: &mut Criterion) {
    c.bench_function("effective_local_size", |b| {
        b.iter(|| calculate_effective_local_size(black_box(16), black_box(4096)));
    });
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

criterion_group!(
    partitioning,
    bench_contiguous,
    bench_from_groups,
    bench_locate,
    bench_effective_local_size,
);

criterion_main!(partitioning);
