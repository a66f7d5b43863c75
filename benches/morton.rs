use criterion::{black_box, criterion_group, criterion_main, Criterion};

use svo_forge::morton;

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("morton codec");
    group.bench_function("encode", |b| {
        b.iter(|| {
            for i in 0..4096u32 {
                black_box(morton::encode(
                    black_box(i),
                    black_box(i.wrapping_mul(31) & 0x1f_ffff),
                    black_box(i.wrapping_mul(17) & 0x1f_ffff),
                ));
            }
        })
    });
    group.bench_function("decode", |b| {
        b.iter(|| {
            for i in 0..4096u64 {
                black_box(morton::decode(black_box(i * 2654435761)));
            }
        })
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
