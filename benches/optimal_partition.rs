use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use geotrack::algorithms::partition::{optimal_partition, PartitionMode};

/// Upper triangular segment costs, `+∞` below the diagonal.
fn random_costs(n: usize, rng: &mut StdRng) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| {
        if j > i {
            (j - i) as f64 * rng.random_range(0.5..1.5)
        } else {
            f64::INFINITY
        }
    })
}

fn bench_partition(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut group = c.benchmark_group("optimal_partition");
    group.sample_size(20);
    for n in [50usize, 100, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || random_costs(n, &mut rng),
                |costs| optimal_partition(black_box(&costs), PartitionMode::Minimise),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_partition);
criterion_main!(benches);
