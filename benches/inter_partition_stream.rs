#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ndarray::Array2;
use partflow::flow_direction::codes::{E, S, SE, SINK, SW};
use partflow::{Partflow, PartitionedArray, Policies};
use std::hint::black_box;

/// A rough drainage pattern: cells drain south-east, south, or south-west in
/// stripes, with a line of sinks along the bottom row.
fn generate_flow_direction(extent: usize) -> Array2<u8> {
    Array2::from_shape_fn((extent, extent), |(r, c)| {
        if r == extent - 1 {
            if c % 7 == 0 { SINK } else { E }
        } else {
            match (c / 16) % 3 {
                0 => SE,
                1 => S,
                _ => SW,
            }
        }
    })
}

// --- BENCHMARKS ---

fn bench_partition_sizes(c: &mut Criterion) {
    let extent = 1024;
    let array = generate_flow_direction(extent);

    let mut group = c.benchmark_group("Inter-partition stream");
    group.throughput(Throughput::Elements((extent * extent) as u64));
    group.sample_size(20);

    for partition_extent in [64, 128, 256] {
        let partitioned = PartitionedArray::from_array(&array, [partition_extent, partition_extent])
            .expect("valid partition shape");
        group.bench_with_input(
            BenchmarkId::from_parameter(partition_extent),
            &partitioned,
            |b, partitioned| {
                b.iter(|| {
                    Partflow::inter_partition_stream(black_box(partitioned), Policies::default())
                        .expect("acyclic input")
                })
            },
        );
    }
    group.finish();
}

fn bench_inflow_count(c: &mut Criterion) {
    let array = generate_flow_direction(1024);
    let partitioned = PartitionedArray::from_array(&array, [128, 128]).expect("valid partition shape");

    c.bench_function("inflow_count_1024_128", |b| {
        b.iter(|| Partflow::inflow_count(black_box(&partitioned), Policies::default()).expect("valid input"))
    });
}

fn bench_pool_sizes(c: &mut Criterion) {
    let array = generate_flow_direction(1024);
    let partitioned = PartitionedArray::from_array(&array, [128, 128]).expect("valid partition shape");

    let mut group = c.benchmark_group("Worker pool");
    group.sample_size(20);
    for num_threads in [1, 2, 4, 8] {
        let options = Partflow::builder().num_threads(num_threads);
        group.bench_with_input(BenchmarkId::from_parameter(num_threads), &options, |b, options| {
            b.iter(|| options.inter_partition_stream(black_box(&partitioned)).expect("acyclic input"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_partition_sizes, bench_inflow_count, bench_pool_sizes);
criterion_main!(benches);
