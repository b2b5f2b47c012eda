use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use jackc::engine;

static INPUT: &str = include_str!("../data/sieve.jack");

fn compile(input: &str) {
    let mut out = Vec::with_capacity(8 * 1024);
    engine::compile(input, &mut out).expect("fixture compiles");
    black_box(out.len());
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("compile", |b| b.iter(|| compile(black_box(INPUT))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
