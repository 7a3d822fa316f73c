use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fluxtap::raptorq::matrix::DenseMatrix;

/// Deterministic full-column-rank {0,1} matrix: row i, column j is set
/// whenever a cheap LCG-derived bit is 1, with the diagonal forced on to
/// guarantee full rank regardless of size.
fn full_rank_matrix(nrows: usize, ncols: usize) -> DenseMatrix {
    DenseMatrix::from_fn(nrows, ncols, |i, j| {
        if i == j {
            return true;
        }
        let mixed = (i as u64).wrapping_mul(2654435761).wrapping_add(j as u64);
        (mixed >> 7) & 1 == 1
    })
}

fn gaussian_elimination_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("inactivation_gaussian_elimination");
    for ncols in [16usize, 64, 256] {
        let nrows = ncols + ncols / 4;
        group.bench_function(BenchmarkId::new("eliminate_full_pivot", ncols), |bencher| {
            bencher.iter_batched(
                || full_rank_matrix(nrows, ncols),
                |mut m| {
                    let mut ops = Vec::new();
                    m.eliminate_full_pivot(|op| ops.push(op));
                    black_box(ops);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, gaussian_elimination_bench);
criterion_main!(benches);
