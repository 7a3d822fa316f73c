use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fluxtap::optimize::xor_bytes;

fn xor_kernel_bench(c: &mut Criterion) {
    let sizes = [64usize, 512, 1500, 8192];

    let mut group = c.benchmark_group("xor_bytes");
    for size in sizes {
        let src = vec![0xA5u8; size];
        group.bench_function(BenchmarkId::new("dispatch", size), |bencher| {
            bencher.iter_batched(
                || vec![0x5Au8; size],
                |mut dst| {
                    xor_bytes(black_box(&mut dst), black_box(&src));
                    black_box(dst);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, xor_kernel_bench);
criterion_main!(benches);
